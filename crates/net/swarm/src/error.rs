use std::{fmt, io};

use libp2p::{Multiaddr, PeerId};
use weft_identity::{IdentityError, VerifyError};

/// Identity handshake failure.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("handshake I/O: {0}")]
    Io(#[from] io::Error),
    #[error("handshake timed out")]
    Timeout,
    #[error("remote does not speak the weft handshake")]
    ProtocolMismatch,
    #[error("remote field too long: {0} bytes")]
    FieldTooLong(usize),
    #[error("remote failed authentication: {0}")]
    Verify(#[from] VerifyError),
    #[error("failed to sign nonce: {0}")]
    Sign(#[from] IdentityError),
    #[error("expected peer {expected}, remote authenticated as {actual}")]
    PeerIdMismatch { expected: PeerId, actual: PeerId },
}

/// Why one address of a dial failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialFailure {
    /// TCP connect failed or timed out.
    Transport(String),
    /// Connected, but the identity handshake failed.
    Handshake(String),
    PeerIdMismatch { expected: PeerId, actual: PeerId },
}

impl From<HandshakeError> for DialFailure {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::PeerIdMismatch { expected, actual } => {
                Self::PeerIdMismatch { expected, actual }
            }
            other => Self::Handshake(other.to_string()),
        }
    }
}

impl fmt::Display for DialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Handshake(e) => write!(f, "handshake: {e}"),
            Self::PeerIdMismatch { expected, actual } => {
                write!(f, "expected peer {expected}, got {actual}")
            }
        }
    }
}

/// A dial to a peer failed.
///
/// Cloneable so every caller waiting on one coalesced dial gets the result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialError {
    #[error("no known addresses for {0}")]
    NoAddresses(PeerId),
    #[error("cannot dial the local peer")]
    DialSelf,
    #[error("all {} addresses of {peer} failed: {}", .failures.len(), FailureList(.failures))]
    AllFailed {
        peer: PeerId,
        failures: Vec<(Multiaddr, DialFailure)>,
    },
    #[error("connection manager shut down")]
    Shutdown,
}

impl DialError {
    /// The peer id the remote presented, when every address reached a
    /// different peer than expected.
    pub fn peer_id_mismatch(&self) -> Option<(PeerId, PeerId)> {
        let Self::AllFailed { failures, .. } = self else {
            return None;
        };
        let mut found = None;
        for (_, failure) in failures {
            match failure {
                DialFailure::PeerIdMismatch { expected, actual } => {
                    found = Some((*expected, *actual));
                }
                _ => return None,
            }
        }
        found
    }

    /// Whether every address connected but failed to authenticate.
    pub fn is_handshake_failure(&self) -> bool {
        match self {
            Self::AllFailed { failures, .. } => {
                !failures.is_empty()
                    && failures
                        .iter()
                        .all(|(_, f)| matches!(f, DialFailure::Handshake(_)))
            }
            _ => false,
        }
    }
}

struct FailureList<'a>(&'a [(Multiaddr, DialFailure)]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (addr, failure)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{addr} ({failure})")?;
        }
        Ok(())
    }
}
