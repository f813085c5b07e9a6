//! Subcommand implementations.

pub(crate) mod echo;
pub(crate) mod hello;
pub(crate) mod id;

use eyre::{Result, WrapErr};
use tracing::info;
use weft_host::{Host, HostConfig, Identity, Multiaddr, PeerInfo};

use crate::cli::{IdentityArgs, listen_addr};

impl IdentityArgs {
    pub(crate) fn identity(&self) -> Result<Identity> {
        match self.seed {
            Some(seed) => Identity::from_seed(seed).wrap_err("failed to derive identity from seed"),
            None => Ok(Identity::random()),
        }
    }
}

/// Start a host listening on `port` on every interface.
pub(crate) async fn start_host(
    identity: &IdentityArgs,
    port: u16,
    config: HostConfig,
) -> Result<Host> {
    let host = Host::new(identity.identity()?, &[listen_addr(port)], config)
        .await
        .wrap_err_with(|| format!("failed to listen on port {port}"))?;

    for addr in host.listen_addrs() {
        println!("I am {}", PeerInfo::new(host.peer_id(), vec![dialable(addr)]));
    }
    Ok(host)
}

/// Swap an unspecified listen IP for loopback so the printed address can be
/// pasted straight into a dialer on the same machine.
fn dialable(addr: Multiaddr) -> Multiaddr {
    addr.into_iter()
        .map(|proto| match proto {
            weft_host::Protocol::Ip4(ip) if ip.is_unspecified() => {
                weft_host::Protocol::Ip4(std::net::Ipv4Addr::LOCALHOST)
            }
            other => other,
        })
        .collect()
}

/// Serve until Ctrl-C, then shut the host down.
pub(crate) async fn serve_until_ctrl_c(host: &Host) -> Result<()> {
    let handle = host.shutdown_handle();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.wrap_err("failed to listen for Ctrl-C")?;
            info!("Received shutdown signal");
            handle.shutdown();
            host.run().await;
        }
        _ = host.run() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_becomes_loopback() {
        let addr: Multiaddr = "/ip4/0.0.0.0/tcp/5550".parse().unwrap();
        assert_eq!(dialable(addr).to_string(), "/ip4/127.0.0.1/tcp/5550");

        let addr: Multiaddr = "/ip4/10.1.2.3/tcp/5550".parse().unwrap();
        assert_eq!(dialable(addr.clone()), addr);
    }

    #[test]
    fn seeded_identity_is_stable() {
        let args = IdentityArgs { seed: Some(9) };
        assert_eq!(
            args.identity().unwrap().peer_id(),
            args.identity().unwrap().peer_id()
        );
    }
}
