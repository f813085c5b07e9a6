use std::io;
use std::time::Duration;

use libp2p::Multiaddr;

/// A listen address could not be acquired.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("cannot listen on {0}: expected /ip4|ip6/<host>/tcp/<port>")]
    Unsupported(Multiaddr),
    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: Multiaddr,
        #[source]
        source: io::Error,
    },
}

/// A single outbound connection attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot dial {0}: expected /ip4|ip6|dns/<host>/tcp/<port>")]
    Unsupported(Multiaddr),
    #[error("connect to {addr} timed out after {timeout:?}")]
    Timeout { addr: Multiaddr, timeout: Duration },
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: Multiaddr,
        #[source]
        source: io::Error,
    },
}
