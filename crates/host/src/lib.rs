//! Weft peer host.
//!
//! A [`Host`] owns a local [`Identity`], listens on TCP multiaddrs, and
//! multiplexes protocol-tagged [`Stream`]s over authenticated connections to
//! other peers. Inbound streams are dispatched to the handler registered for
//! their protocol id with [`Host::set_stream_handler`].
//!
//! ```no_run
//! # async fn example() -> Result<(), weft_host::HostError> {
//! use futures::AsyncWriteExt;
//! use weft_host::{Host, HostConfig, Identity};
//!
//! let host = Host::new(
//!     Identity::random(),
//!     &["/ip4/0.0.0.0/tcp/5550".parse().unwrap()],
//!     HostConfig::default(),
//! )
//! .await?;
//!
//! host.set_stream_handler("/echo/1.0.0", |mut stream| async move {
//!     let _ = stream.write_all(b"hello libp2p!").await;
//!     let _ = stream.close().await;
//! });
//!
//! host.run().await;
//! # Ok(())
//! # }
//! ```

mod config;
pub use config::{HostConfig, PeerstoreConfig};

mod error;
pub use error::HostError;

mod handlers;

mod host;
pub use host::Host;

mod shutdown;
pub use shutdown::{Elapsed, ShutdownHandle, with_deadline};

pub use libp2p::{Multiaddr, PeerId, multiaddr::Protocol};
pub use weft_identity::Identity;
pub use weft_net_mux::{MuxConfig, Stream, StreamError, stream_error};
pub use weft_net_peerstore::{AddressBook, PeerInfo, PeerInfoError};
pub use weft_net_swarm::{Direction, SwarmConfig, SwarmEvent};
