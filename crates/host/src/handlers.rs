//! Protocol id → stream handler table.

use std::collections::HashMap;

use libp2p::PeerId;
use parking_lot::RwLock;
use tracing::debug;
use weft_net_mux::{InboundRouter, StreamHandler};

/// Registered handlers, consulted for every inbound stream.
///
/// Lookups take a read lock only long enough to clone the handler, so
/// registration can run concurrently with dispatch. A change applies to
/// streams opened after it, never to ones already running.
#[derive(Default)]
pub(crate) struct HandlerTable {
    handlers: RwLock<HashMap<String, StreamHandler>>,
}

impl HandlerTable {
    /// Returns `true` if a handler was replaced.
    pub(crate) fn insert(&self, protocol: String, handler: StreamHandler) -> bool {
        debug!(%protocol, "registering stream handler");
        self.handlers.write().insert(protocol, handler).is_some()
    }

    pub(crate) fn remove(&self, protocol: &str) -> bool {
        self.handlers.write().remove(protocol).is_some()
    }

    /// Registered protocol ids, sorted.
    pub(crate) fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self.handlers.read().keys().cloned().collect();
        protocols.sort();
        protocols
    }
}

impl InboundRouter for HandlerTable {
    fn route(&self, _remote: &PeerId, protocol: &str) -> Option<StreamHandler> {
        self.handlers.read().get(protocol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use weft_net_mux::handler;

    use super::*;

    fn noop() -> StreamHandler {
        handler(|_stream| async {})
    }

    #[test]
    fn exact_match_only() {
        let table = HandlerTable::default();
        let peer = weft_identity::Identity::random().peer_id();
        assert!(!table.insert("/echo/1.0.0".into(), noop()));

        assert!(table.route(&peer, "/echo/1.0.0").is_some());
        assert!(table.route(&peer, "/echo/1.0").is_none());
        assert!(table.route(&peer, "/echo/1.0.0/").is_none());
    }

    #[test]
    fn replace_and_remove() {
        let table = HandlerTable::default();
        assert!(!table.insert("/b".into(), noop()));
        assert!(!table.insert("/a".into(), noop()));
        assert!(table.insert("/a".into(), noop()));
        assert_eq!(table.protocols(), vec!["/a".to_string(), "/b".to_string()]);

        assert!(table.remove("/a"));
        assert!(!table.remove("/a"));
        assert_eq!(table.protocols(), vec!["/b".to_string()]);
    }
}
