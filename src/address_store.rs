use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use hickory_proto::rr::{DNSClass, Name, RecordSet};
use tokio::sync::oneshot;
use tracing::debug;

use crate::address_entry::AddressRequest;
use crate::cache::EntryCache;
use crate::config::StoreSettings;
use crate::error::Result;
use crate::fetchable::TtlPolicy;
use crate::hash_key::HashKey;
use crate::nameserver_address::NameserverAddress;
use crate::nameserver_entry::NameserverEntry;
use crate::resolver::Resolver;
use crate::zone_entry::{AddressCallback, ZoneEntry};

/// Entry point for resolution logic: "which address should I send the next
/// query for this zone to?"
///
/// Cheap to clone; clones share the same caches.
#[derive(Clone)]
pub struct AddressStore {
    resolver: Arc<dyn Resolver>,
    zones: Arc<EntryCache<ZoneEntry>>,
    nameservers: Arc<EntryCache<NameserverEntry>>,
    policy: TtlPolicy,
}

impl AddressStore {
    pub fn new(resolver: Arc<dyn Resolver>, settings: &StoreSettings) -> Result<Self> {
        let (zone_capacity, nameserver_capacity) = settings.capacities()?;
        Ok(Self::with_capacity(
            resolver,
            zone_capacity,
            nameserver_capacity,
            settings.ttl_policy(),
        ))
    }

    pub fn with_capacity(
        resolver: Arc<dyn Resolver>,
        zone_capacity: NonZeroUsize,
        nameserver_capacity: NonZeroUsize,
        policy: TtlPolicy,
    ) -> Self {
        Self {
            resolver,
            zones: Arc::new(EntryCache::new(zone_capacity)),
            nameservers: Arc::new(EntryCache::new(nameserver_capacity)),
            policy,
        }
    }

    /// Finds an address for `zone` and hands it to `callback`, or `None`
    /// when no nameserver of the zone is usable.
    ///
    /// The callback runs exactly once, either before this returns or later
    /// from the resolver's context.
    pub fn resolve_address(
        &self,
        zone: &Name,
        class: DNSClass,
        family: AddressRequest,
        callback: AddressCallback,
    ) {
        let key = HashKey::new(zone, class);
        let entry = self.zones.get_or_create(&key, || {
            debug!(zone = %key, "new zone entry");
            ZoneEntry::new(
                zone,
                class,
                Arc::clone(&self.resolver),
                Arc::clone(&self.nameservers),
                self.policy,
            )
        });
        entry.add_callback(family, callback);
    }

    /// Like [`resolve_address`](Self::resolve_address) for a zone we were
    /// just referred to: a zone not cached yet is seeded from `ns_set`
    /// instead of querying for it.
    pub fn resolve_address_with_referral(
        &self,
        ns_set: &RecordSet,
        family: AddressRequest,
        callback: AddressCallback,
    ) -> Result<()> {
        let key = HashKey::new(ns_set.name(), ns_set.dns_class());
        let mut seeded = match self.zones.get(&key) {
            Some(_) => None,
            None => Some(ZoneEntry::from_referral(
                ns_set,
                Arc::clone(&self.resolver),
                Arc::clone(&self.nameservers),
                self.policy,
                Instant::now(),
            )?),
        };
        let entry = self.zones.get_or_create(&key, || {
            seeded.take().unwrap_or_else(|| {
                ZoneEntry::new(
                    ns_set.name(),
                    ns_set.dns_class(),
                    Arc::clone(&self.resolver),
                    Arc::clone(&self.nameservers),
                    self.policy,
                )
            })
        });
        entry.add_callback(family, callback);
        Ok(())
    }

    /// Async wrapper over [`resolve_address`](Self::resolve_address).
    pub async fn lookup(
        &self,
        zone: &Name,
        class: DNSClass,
        family: AddressRequest,
    ) -> Option<NameserverAddress> {
        let (tx, rx) = oneshot::channel();
        self.resolve_address(
            zone,
            class,
            family,
            Box::new(move |found: Option<NameserverAddress>| {
                let _ = tx.send(found);
            }),
        );
        rx.await.ok().flatten()
    }

    pub fn zone(&self, zone: &Name, class: DNSClass) -> Option<Arc<ZoneEntry>> {
        self.zones.get(&HashKey::new(zone, class))
    }

    pub fn nameserver(&self, name: &Name, class: DNSClass) -> Option<Arc<NameserverEntry>> {
        self.nameservers.get(&HashKey::new(name, class))
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn nameserver_count(&self) -> usize {
        self.nameservers.len()
    }
}
