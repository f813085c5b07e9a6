//! TCP transport addressed by multiaddrs.
//!
//! - [`Listener`] binds a local `/ip4|ip6/<host>/tcp/<port>` address and accepts raw sockets
//! - [`dial`] connects to a remote address within a deadline
//! - [`multiaddr_to_dial_target`] / [`socket_addr_to_multiaddr`] convert between forms
//!
//! Sockets come out of this crate unauthenticated; identity verification happens
//! one layer up.

mod addr;
mod dial;
mod error;
mod listener;

pub use addr::{DialTarget, multiaddr_to_dial_target, socket_addr_to_multiaddr};
pub use dial::dial;
pub use error::{BindError, TransportError};
pub use listener::Listener;
