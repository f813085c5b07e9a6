//! Address book using the Arc-per-peer pattern for minimal lock contention.

use std::collections::HashMap;
use std::sync::Arc;

use libp2p::{Multiaddr, PeerId};
use parking_lot::RwLock;
use tracing::{debug, trace};
use web_time::Instant;

use crate::record::PeerAddrs;
use crate::ttl::AddrTtl;

/// Type alias for the internal peer map to avoid clippy::type_complexity.
type PeerMap = HashMap<PeerId, Arc<PeerAddrs>>;

/// In-memory peer id → address mapping.
///
/// The book-wide lock is held only long enough to fetch a peer's `Arc`;
/// address updates for different peers never contend.
#[derive(Debug, Default)]
pub struct AddressBook {
    /// Readers take the lock just long enough to clone a peer's Arc.
    peers: RwLock<PeerMap>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on `peer`'s record, creating it if needed.
    ///
    /// The map lock stays held across `f`, so a concurrent sweep or
    /// `remove_peer` cannot unlink the record while it is being written.
    /// Writers to different peers still only share the read lock.
    fn with_record<R>(&self, peer: PeerId, f: impl FnOnce(&PeerAddrs) -> R) -> R {
        // Fast path: read lock
        {
            let peers = self.peers.read();
            if let Some(record) = peers.get(&peer) {
                return f(record);
            }
        }

        // Slow path: write lock (only on first access per peer)
        let mut peers = self.peers.write();
        let record = peers.entry(peer).or_insert_with(|| {
            trace!(%peer, "new peer added to address book");
            Arc::new(PeerAddrs::new())
        });
        f(record)
    }

    fn existing(&self, peer: &PeerId) -> Option<Arc<PeerAddrs>> {
        self.peers.read().get(peer).map(Arc::clone)
    }

    /// Insert or refresh an address. Repeating the same call is a no-op.
    pub fn add_addr(&self, peer: PeerId, addr: Multiaddr, ttl: AddrTtl) {
        debug!(%peer, %addr, ?ttl, "adding address");
        self.with_record(peer, |record| record.add(addr, ttl, Instant::now()));
    }

    pub fn add_addrs(&self, peer: PeerId, addrs: impl IntoIterator<Item = Multiaddr>, ttl: AddrTtl) {
        let now = Instant::now();
        self.with_record(peer, |record| {
            for addr in addrs {
                record.add(addr, ttl, now);
            }
        });
    }

    /// Overwrite an address's expiry; a zero TTL removes it.
    pub fn set_addr(&self, peer: PeerId, addr: Multiaddr, ttl: AddrTtl) {
        if ttl.is_zero() {
            if let Some(record) = self.peers.read().get(&peer) {
                record.set(addr, ttl, Instant::now());
            }
            return;
        }
        self.with_record(peer, |record| record.set(addr, ttl, Instant::now()));
    }

    /// Non-expired addresses for `peer`; empty when unknown.
    pub fn addrs(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.existing(peer)
            .map(|record| record.live(Instant::now()))
            .unwrap_or_default()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.read().contains_key(peer)
    }

    /// Every peer with a record, including ones whose addresses all expired
    /// but have not been swept yet.
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.read().keys().copied().collect()
    }

    /// Peers with at least one live address.
    pub fn peers_with_addrs(&self) -> Vec<PeerId> {
        let now = Instant::now();
        self.peers
            .read()
            .iter()
            .filter(|(_, record)| !record.live(now).is_empty())
            .map(|(peer, _)| *peer)
            .collect()
    }

    pub fn clear_addrs(&self, peer: &PeerId) {
        if let Some(record) = self.existing(peer) {
            record.clear();
        }
    }

    pub fn remove_peer(&self, peer: &PeerId) {
        self.peers.write().remove(peer);
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired addresses and peers left with none. Returns addresses removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut peers = self.peers.write();
        let removed: usize = peers.values().map(|record| record.sweep(now)).sum();
        peers.retain(|_, record| !record.is_empty());

        if removed > 0 {
            debug!(count = removed, "swept expired addresses");
        }
        removed
    }
}
