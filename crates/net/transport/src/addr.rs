//! Multiaddr ↔ socket address conversion.

use std::net::{IpAddr, SocketAddr};

use libp2p::Multiaddr;
use libp2p::multiaddr::Protocol;

/// Where a TCP connection should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialTarget {
    Socket(SocketAddr),
    /// DNS name still to be resolved.
    Host(String, u16),
}

/// Extract a TCP dial target. A trailing `/p2p/<id>` is ignored; anything else
/// past the port makes the address unsupported.
pub fn multiaddr_to_dial_target(addr: &Multiaddr) -> Option<DialTarget> {
    let mut iter = addr.iter();

    let host = iter.next()?;
    let port = match iter.next()? {
        Protocol::Tcp(port) => port,
        _ => return None,
    };

    match iter.next() {
        None | Some(Protocol::P2p(_)) => {}
        Some(_) => return None,
    }
    if iter.next().is_some() {
        return None;
    }

    match host {
        Protocol::Ip4(ip) => Some(DialTarget::Socket(SocketAddr::new(IpAddr::V4(ip), port))),
        Protocol::Ip6(ip) => Some(DialTarget::Socket(SocketAddr::new(IpAddr::V6(ip), port))),
        Protocol::Dns(name) | Protocol::Dns4(name) | Protocol::Dns6(name) => {
            Some(DialTarget::Host(name.into_owned(), port))
        }
        _ => None,
    }
}

/// Listening needs a concrete socket address, not a DNS name.
pub(crate) fn multiaddr_to_socket_addr(addr: &Multiaddr) -> Option<SocketAddr> {
    match multiaddr_to_dial_target(addr)? {
        DialTarget::Socket(socket) => Some(socket),
        DialTarget::Host(..) => None,
    }
}

pub fn socket_addr_to_multiaddr(addr: SocketAddr) -> Multiaddr {
    Multiaddr::empty()
        .with(addr.ip().into())
        .with(Protocol::Tcp(addr.port()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip4_tcp() {
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/5550".parse().unwrap();
        assert_eq!(
            multiaddr_to_dial_target(&addr),
            Some(DialTarget::Socket("127.0.0.1:5550".parse().unwrap()))
        );
    }

    #[test]
    fn ip6_tcp() {
        let addr: Multiaddr = "/ip6/::1/tcp/4001".parse().unwrap();
        assert_eq!(
            multiaddr_to_socket_addr(&addr),
            Some("[::1]:4001".parse().unwrap())
        );
    }

    #[test]
    fn dns_is_dialable_but_not_listenable() {
        let addr: Multiaddr = "/dns4/localhost/tcp/80".parse().unwrap();
        assert_eq!(
            multiaddr_to_dial_target(&addr),
            Some(DialTarget::Host("localhost".into(), 80))
        );
        assert_eq!(multiaddr_to_socket_addr(&addr), None);
    }

    #[test]
    fn trailing_p2p_is_ignored() {
        let id = libp2p::PeerId::random();
        let addr: Multiaddr = format!("/ip4/10.0.0.2/tcp/1/p2p/{id}").parse().unwrap();
        assert!(multiaddr_to_dial_target(&addr).is_some());
    }

    #[test]
    fn unsupported_forms() {
        for text in ["/ip4/1.2.3.4/udp/5", "/ip4/1.2.3.4", "/ip4/1.2.3.4/tcp/1/ws"] {
            let addr: Multiaddr = text.parse().unwrap();
            assert_eq!(multiaddr_to_dial_target(&addr), None, "{text}");
        }
    }

    #[test]
    fn socket_round_trip() {
        let socket: SocketAddr = "192.168.1.9:7000".parse().unwrap();
        let addr = socket_addr_to_multiaddr(socket);
        assert_eq!(addr.to_string(), "/ip4/192.168.1.9/tcp/7000");
        assert_eq!(multiaddr_to_socket_addr(&addr), Some(socket));
    }
}
