//! Per-peer address set guarded by its own lock.

use libp2p::Multiaddr;
use parking_lot::RwLock;
use web_time::Instant;

use crate::ttl::{AddrTtl, Expiry};

#[derive(Debug, Clone)]
struct AddrEntry {
    addr: Multiaddr,
    expiry: Expiry,
}

/// Addresses known for one peer, in first-insertion order.
///
/// Shared as `Arc<PeerAddrs>`; callers holding the Arc never touch the
/// book-wide lock again.
#[derive(Debug, Default)]
pub struct PeerAddrs {
    entries: RwLock<Vec<AddrEntry>>,
}

impl PeerAddrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh. An existing entry keeps the later of the two expiries.
    pub fn add(&self, addr: Multiaddr, ttl: AddrTtl, now: Instant) {
        let expiry = ttl.expiry_from(now);
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.addr == addr) {
            Some(entry) => entry.expiry = entry.expiry.max(expiry),
            None => entries.push(AddrEntry { addr, expiry }),
        }
    }

    /// Overwrite the expiry. A zero TTL removes the address.
    pub fn set(&self, addr: Multiaddr, ttl: AddrTtl, now: Instant) {
        let mut entries = self.entries.write();
        if ttl.is_zero() {
            entries.retain(|e| e.addr != addr);
            return;
        }
        let expiry = ttl.expiry_from(now);
        match entries.iter_mut().find(|e| e.addr == addr) {
            Some(entry) => entry.expiry = expiry,
            None => entries.push(AddrEntry { addr, expiry }),
        }
    }

    /// Non-expired addresses at `now`.
    pub fn live(&self, now: Instant) -> Vec<Multiaddr> {
        self.entries
            .read()
            .iter()
            .filter(|e| !e.expiry.is_expired(now))
            .map(|e| e.addr.clone())
            .collect()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !e.expiry.is_expired(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ttl::{PERMANENT_ADDR_TTL, TEMP_ADDR_TTL};

    fn addr(n: u8) -> Multiaddr {
        format!("/ip4/127.0.0.{n}/tcp/5550").parse().unwrap()
    }

    #[test]
    fn add_is_idempotent() {
        let record = PeerAddrs::new();
        let now = Instant::now();

        record.add(addr(1), TEMP_ADDR_TTL, now);
        record.add(addr(1), TEMP_ADDR_TTL, now);

        assert_eq!(record.len(), 1);
        assert_eq!(record.live(now), vec![addr(1)]);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let record = PeerAddrs::new();
        let now = Instant::now();

        record.add(addr(3), TEMP_ADDR_TTL, now);
        record.add(addr(1), TEMP_ADDR_TTL, now);
        record.add(addr(2), TEMP_ADDR_TTL, now);

        assert_eq!(record.live(now), vec![addr(3), addr(1), addr(2)]);
    }

    #[test]
    fn refresh_never_shortens() {
        let record = PeerAddrs::new();
        let now = Instant::now();

        record.add(addr(1), AddrTtl::For(Duration::from_secs(60)), now);
        record.add(addr(1), AddrTtl::For(Duration::from_secs(1)), now);

        assert_eq!(record.live(now + Duration::from_secs(30)), vec![addr(1)]);
    }

    #[test]
    fn refresh_extends_from_touch_time() {
        let record = PeerAddrs::new();
        let start = Instant::now();
        let ttl = AddrTtl::For(Duration::from_secs(10));

        record.add(addr(1), ttl, start);
        record.add(addr(1), ttl, start + Duration::from_secs(8));

        assert_eq!(record.live(start + Duration::from_secs(15)), vec![addr(1)]);
        assert!(record.live(start + Duration::from_secs(18)).is_empty());
    }

    #[test]
    fn permanent_dominates() {
        let record = PeerAddrs::new();
        let now = Instant::now();

        record.add(addr(1), PERMANENT_ADDR_TTL, now);
        record.add(addr(1), AddrTtl::For(Duration::from_secs(1)), now);

        assert_eq!(record.live(now + Duration::from_secs(3600)), vec![addr(1)]);
    }

    #[test]
    fn set_overwrites_and_zero_removes() {
        let record = PeerAddrs::new();
        let now = Instant::now();

        record.add(addr(1), PERMANENT_ADDR_TTL, now);
        record.set(addr(1), AddrTtl::For(Duration::from_secs(1)), now);
        assert!(record.live(now + Duration::from_secs(2)).is_empty());

        record.set(addr(2), TEMP_ADDR_TTL, now);
        record.set(addr(2), AddrTtl::For(Duration::ZERO), now);
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let record = PeerAddrs::new();
        let now = Instant::now();

        record.add(addr(1), AddrTtl::For(Duration::from_secs(1)), now);
        record.add(addr(2), PERMANENT_ADDR_TTL, now);

        assert_eq!(record.sweep(now + Duration::from_secs(2)), 1);
        assert_eq!(record.live(now), vec![addr(2)]);
    }
}
