//! Outbound TCP connection attempts.

use std::time::Duration;

use libp2p::Multiaddr;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::addr::{DialTarget, multiaddr_to_dial_target};
use crate::error::TransportError;

/// Connect to `addr`, giving up after `timeout`.
pub async fn dial(addr: &Multiaddr, timeout: Duration) -> Result<TcpStream, TransportError> {
    let target =
        multiaddr_to_dial_target(addr).ok_or_else(|| TransportError::Unsupported(addr.clone()))?;

    trace!(%addr, "dialing");
    let connect = async {
        match &target {
            DialTarget::Socket(socket) => TcpStream::connect(*socket).await,
            DialTarget::Host(host, port) => TcpStream::connect((host.as_str(), *port)).await,
        }
    };

    let stream = match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            debug!(%addr, error = %source, "dial failed");
            return Err(TransportError::Connect {
                addr: addr.clone(),
                source,
            });
        }
        Err(_) => {
            debug!(%addr, ?timeout, "dial timed out");
            return Err(TransportError::Timeout {
                addr: addr.clone(),
                timeout,
            });
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        warn!(%addr, error = %e, "failed to set TCP_NODELAY");
    }

    Ok(stream)
}
