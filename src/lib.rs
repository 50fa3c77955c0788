//! Nameserver address store: picks which nameserver address to query next
//! for a zone, caching NS and address records with LRU eviction and
//! lazy TTL expiry.

pub mod address_entry;
pub mod address_store;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetchable;
mod hash_index;
pub mod hash_key;
mod lru_list;
pub mod nameserver_address;
pub mod nameserver_entry;
pub mod resolver;
pub mod upstream;
pub mod watcher;
pub mod zone_entry;

#[cfg(test)]
mod test_support;

pub use address_entry::{AddressEntry, AddressRequest};
pub use address_store::AddressStore;
pub use error::{NsasError, ResolveError};
pub use fetchable::{FetchState, TtlPolicy};
pub use hash_key::HashKey;
pub use nameserver_address::NameserverAddress;
pub use nameserver_entry::NameserverEntry;
pub use resolver::{Completion, Resolver, completion};
pub use upstream::UpstreamResolver;
pub use zone_entry::ZoneEntry;
