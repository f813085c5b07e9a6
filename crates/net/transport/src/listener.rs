//! Inbound TCP listener.

use std::io;

use libp2p::Multiaddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::addr::{multiaddr_to_socket_addr, socket_addr_to_multiaddr};
use crate::error::BindError;

/// A bound TCP listener.
///
/// Dropping it releases the port.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    /// Bound address with any port 0 resolved.
    local_addr: Multiaddr,
}

impl Listener {
    pub async fn bind(addr: &Multiaddr) -> Result<Self, BindError> {
        let socket =
            multiaddr_to_socket_addr(addr).ok_or_else(|| BindError::Unsupported(addr.clone()))?;

        let inner = TcpListener::bind(socket).await.map_err(|source| BindError::Io {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = inner
            .local_addr()
            .map(socket_addr_to_multiaddr)
            .map_err(|source| BindError::Io {
                addr: addr.clone(),
                source,
            })?;

        info!(addr = %local_addr, "listening for inbound connections");
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> &Multiaddr {
        &self.local_addr
    }

    /// Accept the next inbound connection.
    pub async fn accept(&self) -> io::Result<(TcpStream, Multiaddr)> {
        let (stream, remote) = self.inner.accept().await?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %remote, error = %e, "failed to set TCP_NODELAY");
        }

        let remote = socket_addr_to_multiaddr(remote);
        debug!(addr = %remote, "accepted inbound connection");
        Ok((stream, remote))
    }
}
