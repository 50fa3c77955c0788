use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::address_entry::AddressEntry;
use crate::nameserver_entry::NameserverEntry;

/// The address picked for a query, tied to the nameserver it belongs to so
/// the measured outcome can be fed back.
#[derive(Clone)]
pub struct NameserverAddress {
    nameserver: Arc<NameserverEntry>,
    address: AddressEntry,
}

impl NameserverAddress {
    pub fn new(nameserver: Arc<NameserverEntry>, address: AddressEntry) -> Self {
        Self { nameserver, address }
    }

    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }

    /// Snapshot of the address as it was when selected.
    #[inline]
    pub fn address(&self) -> &AddressEntry {
        &self.address
    }

    #[inline]
    pub fn nameserver(&self) -> &Arc<NameserverEntry> {
        &self.nameserver
    }

    /// Records how long the query to this address took.
    pub fn update_rtt(&self, rtt: Duration) {
        self.nameserver.update_address_rtt(&self.address.ip(), rtt);
    }

    /// Records that the query to this address went unanswered.
    pub fn mark_unreachable(&self) {
        self.nameserver.set_address_unreachable(&self.address.ip());
    }
}

impl fmt::Debug for NameserverAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameserverAddress")
            .field("nameserver", self.nameserver.hash_key())
            .field("address", &self.address)
            .finish()
    }
}
