//! Connection manager for weft hosts.
//!
//! The [`Swarm`] turns raw TCP sockets into authenticated, multiplexed
//! connections and keeps at most one live connection per remote peer:
//!
//! - outbound: [`Swarm::dial`] tries the peer's known addresses in order;
//!   concurrent dials to one peer share a single attempt
//! - inbound: listeners accept sockets and authenticate them on their own task
//! - lifecycle changes are broadcast as [`SwarmEvent`]s

mod config;
pub use config::{DEFAULT_DIAL_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, SwarmConfig};

mod error;
pub use error::{DialError, DialFailure, HandshakeError};

mod events;
pub use events::{EventEmitter, SwarmEvent};

pub mod handshake;

mod swarm;
pub use swarm::Swarm;

pub use weft_net_mux::{Connection, Direction};
