//! Peer id plus the addresses it can be reached at.

use std::fmt;
use std::str::FromStr;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

#[derive(Debug, thiserror::Error)]
pub enum PeerInfoError {
    #[error("invalid multiaddr: {0}")]
    InvalidMultiaddr(#[from] libp2p::multiaddr::Error),
    #[error("multiaddr {0} does not end with /p2p/<peer-id>")]
    MissingPeerId(Multiaddr),
}

/// A peer and the transport addresses known for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerInfo {
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }

    /// Split `/ip4/1.2.3.4/tcp/5550/p2p/<id>` into the transport part and the peer id.
    pub fn from_p2p_addr(addr: &Multiaddr) -> Result<Self, PeerInfoError> {
        let mut transport = addr.clone();
        match transport.pop() {
            Some(Protocol::P2p(id)) => Ok(Self {
                id,
                addrs: if transport.is_empty() {
                    Vec::new()
                } else {
                    vec![transport]
                },
            }),
            _ => Err(PeerInfoError::MissingPeerId(addr.clone())),
        }
    }

    /// Full `/…/p2p/<id>` forms of every known address.
    pub fn p2p_addrs(&self) -> Vec<Multiaddr> {
        self.addrs
            .iter()
            .map(|addr| addr.clone().with(Protocol::P2p(self.id)))
            .collect()
    }
}

impl FromStr for PeerInfo {
    type Err = PeerInfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: Multiaddr = s.parse()?;
        Self::from_p2p_addr(&addr)
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addrs.first() {
            Some(addr) => write!(f, "{addr}/p2p/{}", self.id),
            None => write!(f, "/p2p/{}", self.id),
        }
    }
}
