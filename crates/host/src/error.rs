use std::time::Duration;

use libp2p::PeerId;
use weft_net_mux::MuxError;
use weft_net_swarm::DialError;
use weft_net_transport::BindError;

/// Errors returned by [`Host`](crate::Host) operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("no known addresses for {0}")]
    NoAddresses(PeerId),
    #[error("dial failed: {0}")]
    Dial(DialError),
    #[error("peer rejected protocol {protocol}")]
    ProtocolRejected { protocol: String },
    #[error("operation canceled by host shutdown")]
    Canceled,
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("connection lost")]
    ConnectionLost,
    #[error("stream reset by peer")]
    StreamReset,
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("expected peer {expected}, remote authenticated as {actual}")]
    PeerIdMismatch { expected: PeerId, actual: PeerId },
    #[error("invalid protocol id")]
    InvalidProtocol,
}

impl From<DialError> for HostError {
    fn from(err: DialError) -> Self {
        if let Some((expected, actual)) = err.peer_id_mismatch() {
            return Self::PeerIdMismatch { expected, actual };
        }
        if err.is_handshake_failure() {
            return Self::Handshake(err.to_string());
        }
        match err {
            DialError::NoAddresses(peer) => Self::NoAddresses(peer),
            DialError::Shutdown => Self::Canceled,
            other => Self::Dial(other),
        }
    }
}

impl From<MuxError> for HostError {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::ProtocolRejected { protocol } => Self::ProtocolRejected { protocol },
            MuxError::DeadlineExceeded(after) => Self::DeadlineExceeded(after),
            MuxError::ConnectionLost => Self::ConnectionLost,
            MuxError::StreamReset => Self::StreamReset,
            MuxError::InvalidProtocol => Self::InvalidProtocol,
        }
    }
}
