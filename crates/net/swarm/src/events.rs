//! Swarm events and non-blocking broadcast emitter.

use libp2p::{Multiaddr, PeerId};
use tokio::sync::broadcast;
use weft_net_mux::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwarmEvent {
    ConnectionEstablished {
        peer: PeerId,
        direction: Direction,
        addr: Multiaddr,
    },
    ConnectionClosed {
        peer: PeerId,
    },
    DialFailed {
        peer: PeerId,
    },
    /// An inbound connection failed before it was authenticated.
    IncomingConnectionError {
        addr: Multiaddr,
        error: String,
    },
    ListenerClosed {
        addr: Multiaddr,
    },
}

impl SwarmEvent {
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            Self::ConnectionEstablished { peer, .. }
            | Self::ConnectionClosed { peer }
            | Self::DialFailed { peer } => Some(peer),
            Self::IncomingConnectionError { .. } | Self::ListenerClosed { .. } => None,
        }
    }
}

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<SwarmEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: SwarmEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub(crate) fn established(&self, peer: PeerId, direction: Direction, addr: Multiaddr) {
        self.emit(SwarmEvent::ConnectionEstablished {
            peer,
            direction,
            addr,
        });
    }

    pub(crate) fn closed(&self, peer: PeerId) {
        self.emit(SwarmEvent::ConnectionClosed { peer });
    }

    pub(crate) fn dial_failed(&self, peer: PeerId) {
        self.emit(SwarmEvent::DialFailed { peer });
    }

    pub(crate) fn incoming_error(&self, addr: Multiaddr, error: String) {
        self.emit(SwarmEvent::IncomingConnectionError { addr, error });
    }

    pub(crate) fn listener_closed(&self, addr: Multiaddr) {
        self.emit(SwarmEvent::ListenerClosed { addr });
    }
}
