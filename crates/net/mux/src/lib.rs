//! Stream multiplexing over a single TCP connection.
//!
//! A [`Connection`] carries any number of [`Stream`]s, each tagged with a
//! protocol id. Outbound streams are opened with [`Connection::open_stream`];
//! inbound ones are handed to the [`StreamHandler`] an [`InboundRouter`]
//! resolves for their protocol, each on its own task.
//!
//! Stream ids opened by the dialing side are odd, those opened by the
//! listening side even, so both ends allocate ids without coordination.

mod config;
pub use config::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_INBOUND_STREAMS, DEFAULT_OPEN_TIMEOUT, DEFAULT_READ_BUFFER,
    DEFAULT_WRITE_QUEUE, MuxConfig,
};

mod connection;
pub use connection::{CloseReason, Connection, ConnectionId, Direction};

mod driver;

mod error;
pub use error::{MuxError, StreamError, stream_error};

pub mod frame;

mod router;
pub use router::{InboundRouter, RejectAll, StreamHandler, handler};

mod stream;
pub use stream::Stream;
