//! Address time-to-live policies.

use std::time::Duration;

use web_time::Instant;

/// How long an address stays in the book after insertion or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrTtl {
    /// Never expires automatically.
    Permanent,
    /// Expires this long after the last insert/refresh.
    For(Duration),
}

/// Addresses learned in passing (e.g. from an inbound connection).
pub const TEMP_ADDR_TTL: AddrTtl = AddrTtl::For(Duration::from_secs(2 * 60));

/// Addresses of peers we connected to recently.
pub const RECENTLY_CONNECTED_ADDR_TTL: AddrTtl = AddrTtl::For(Duration::from_secs(10 * 60));

/// Addresses with reasonable confidence, e.g. supplied by the application.
pub const ADDRESS_TTL: AddrTtl = AddrTtl::For(Duration::from_secs(60 * 60));

/// Addresses that must never expire (bootstrap peers, explicit `connect` targets).
pub const PERMANENT_ADDR_TTL: AddrTtl = AddrTtl::Permanent;

impl AddrTtl {
    /// Absolute expiry for an entry touched at `now`.
    pub fn expiry_from(self, now: Instant) -> Expiry {
        match self {
            Self::Permanent => Expiry::Never,
            Self::For(ttl) => match now.checked_add(ttl) {
                Some(at) => Expiry::At(at),
                None => Expiry::Never,
            },
        }
    }

    /// A zero TTL means "remove" for [`AddressBook::set_addr`](crate::AddressBook::set_addr).
    pub fn is_zero(self) -> bool {
        matches!(self, Self::For(ttl) if ttl.is_zero())
    }
}

/// Absolute expiry of a single address. `Never` orders after every `At`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expiry {
    At(Instant),
    Never,
}

impl Expiry {
    pub fn is_expired(&self, now: Instant) -> bool {
        match self {
            Self::At(at) => *at <= now,
            Self::Never => false,
        }
    }
}
