//! Multiplexer errors.

use std::{io, time::Duration};

/// Failure to open an outbound stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxError {
    #[error("remote rejected protocol {protocol}")]
    ProtocolRejected { protocol: String },
    #[error("stream open not acknowledged within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("connection lost")]
    ConnectionLost,
    #[error("stream reset by remote while opening")]
    StreamReset,
    #[error("invalid protocol id")]
    InvalidProtocol,
}

/// Failure of an established stream.
///
/// Carried as the inner error of the `io::Error` returned from `AsyncRead` /
/// `AsyncWrite`, with a matching `ErrorKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("connection lost")]
    ConnectionLost,
    #[error("stream reset")]
    Reset,
    #[error("write side closed")]
    WriteClosed,
}

impl StreamError {
    pub fn kind(self) -> io::ErrorKind {
        match self {
            Self::ConnectionLost => io::ErrorKind::ConnectionAborted,
            Self::Reset => io::ErrorKind::ConnectionReset,
            Self::WriteClosed => io::ErrorKind::BrokenPipe,
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        io::Error::new(err.kind(), err)
    }
}

/// Recover the `StreamError` behind a stream I/O failure, if any.
pub fn stream_error(err: &io::Error) -> Option<StreamError> {
    err.get_ref()?.downcast_ref::<StreamError>().copied()
}
