//! In-memory address book with Arc-per-peer pattern for minimal lock contention.

pub mod book;
pub mod info;
pub mod record;
pub mod ttl;

pub use book::AddressBook;
pub use info::{PeerInfo, PeerInfoError};
pub use record::PeerAddrs;
pub use ttl::{
    ADDRESS_TTL, AddrTtl, Expiry, PERMANENT_ADDR_TTL, RECENTLY_CONNECTED_ADDR_TTL, TEMP_ADDR_TTL,
};
