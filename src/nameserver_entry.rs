use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::rr::{DNSClass, Name, RData, RecordSet, RecordType};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::address_entry::{AddressEntry, AddressRequest};
use crate::error::{NsasError, ResolveError, Result};
use crate::fetchable::{FetchState, Fetchable, TtlPolicy};
use crate::hash_key::HashKey;
use crate::resolver::{Resolver, completion, make_query};

/// Invoked once the entry has something to say about the requested family.
pub type NameserverCallback = Box<dyn FnOnce(&Arc<NameserverEntry>) + Send + 'static>;

/// A nameserver and the addresses we know for it.
///
/// One entry may be shared by many zones. A and AAAA data share a single
/// expiration time (the earlier of the two TTLs); once it passes the next
/// access finds the entry `NotAsked` and a new fetch is started.
pub struct NameserverEntry {
    key: HashKey,
    policy: TtlPolicy,
    inner: Mutex<Inner>,
}

struct Inner {
    state: FetchState,
    addresses: Vec<AddressEntry>,
    // Addresses from the previous round, kept so a refetch keeps RTTs.
    previous: Vec<AddressEntry>,
    expiration: Option<Instant>,
    pending: VecDeque<(NameserverCallback, AddressRequest)>,
    waiting_responses: usize,
}

impl Fetchable for Inner {
    fn fetch_state(&self) -> FetchState {
        self.state
    }

    fn set_fetch_state(&mut self, state: FetchState) {
        self.state = state;
    }

    fn expiration(&self) -> Option<Instant> {
        self.expiration
    }
}

impl Inner {
    fn empty() -> Self {
        Self {
            state: FetchState::NotAsked,
            addresses: Vec::new(),
            previous: Vec::new(),
            expiration: None,
            pending: VecDeque::new(),
            waiting_responses: 0,
        }
    }

    fn has_family(&self, family: AddressRequest) -> bool {
        self.addresses.iter().any(|a| family.matches(&a.ip()))
    }

    /// Whether a callback for `family` can run now rather than wait.
    fn satisfies(&self, family: AddressRequest) -> bool {
        self.state.is_terminal() || self.has_family(family)
    }

    fn take_satisfied(&mut self) -> Vec<NameserverCallback> {
        let pending = std::mem::take(&mut self.pending);
        let mut ready = Vec::new();
        for (callback, family) in pending {
            if self.satisfies(family) {
                ready.push(callback);
            } else {
                self.pending.push_back((callback, family));
            }
        }
        ready
    }

    fn lower_expiration(&mut self, expires: Instant) {
        self.expiration = Some(match self.expiration {
            Some(current) => current.min(expires),
            None => expires,
        });
    }

    /// Replaces the addresses of one family, carrying RTTs over for IPs we
    /// already knew.
    fn replace_family(&mut self, record_type: RecordType, fresh: Vec<AddressEntry>) {
        let v4 = record_type == RecordType::A;
        let mut replaced = Vec::new();
        self.addresses.retain(|a| {
            if a.is_v4() == v4 {
                replaced.push(a.clone());
                false
            } else {
                true
            }
        });
        for mut address in fresh {
            let known = replaced
                .iter()
                .chain(self.previous.iter())
                .find(|old| old.ip() == address.ip());
            if let Some(old) = known {
                address = old.clone();
            }
            self.addresses.push(address);
        }
    }

    fn address_mut(&mut self, ip: &IpAddr) -> Option<&mut AddressEntry> {
        self.addresses.iter_mut().find(|a| a.ip() == *ip)
    }
}

impl NameserverEntry {
    /// An entry with no addresses yet; the first `ask_ip` fetches them.
    pub fn new(name: &Name, class: DNSClass, policy: TtlPolicy) -> Self {
        Self {
            key: HashKey::new(name, class),
            policy,
            inner: Mutex::new(Inner::empty()),
        }
    }

    /// Builds an entry from glue or previously fetched A/AAAA RRsets.
    ///
    /// Name and class come from the records. When the owner names of the two
    /// sets disagree the A set wins and the AAAA set is dropped with a
    /// warning; disagreeing classes are an error.
    pub fn from_rrsets(
        v4: Option<&RecordSet>,
        v6: Option<&RecordSet>,
        policy: TtlPolicy,
        now: Instant,
    ) -> Result<Self> {
        if let Some(set) = v4 {
            expect_type(set, RecordType::A)?;
        }
        if let Some(set) = v6 {
            expect_type(set, RecordType::AAAA)?;
        }

        let (v4, v6) = match (v4, v6) {
            (None, None) => return Err(NsasError::NoRecords),
            (Some(a), Some(aaaa)) => {
                if a.dns_class() != aaaa.dns_class() {
                    return Err(NsasError::InconsistentClass {
                        expected: a.dns_class(),
                        found: aaaa.dns_class(),
                    });
                }
                let v4_owner = HashKey::new(a.name(), a.dns_class());
                if v4_owner != HashKey::new(aaaa.name(), aaaa.dns_class()) {
                    warn!(
                        v4_owner = %a.name(),
                        v6_owner = %aaaa.name(),
                        "inconsistent owner names for nameserver address sets, ignoring AAAA"
                    );
                    (Some(a), None)
                } else {
                    (Some(a), Some(aaaa))
                }
            }
            other => other,
        };

        let source = v4.or(v6).ok_or(NsasError::NoRecords)?;
        let entry = Self::new(source.name(), source.dns_class(), policy);
        {
            let mut inner = entry.inner.lock();
            for set in [v4, v6].into_iter().flatten() {
                inner.replace_family(set.record_type(), addresses_of(set));
                inner.lower_expiration(policy.expires_at(now, set.ttl()));
            }
            if !inner.addresses.is_empty() {
                inner.state = FetchState::Ready;
            }
        }
        Ok(entry)
    }

    #[inline]
    pub fn name(&self) -> &Name {
        self.key.name()
    }

    #[inline]
    pub fn class(&self) -> DNSClass {
        self.key.class()
    }

    #[inline]
    pub fn hash_key(&self) -> &HashKey {
        &self.key
    }

    pub fn expiration(&self) -> Option<Instant> {
        self.inner.lock().expiration
    }

    pub fn state(&self) -> FetchState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> FetchState {
        self.inner.lock().current_state(now)
    }

    /// Copies out the addresses of `family` along with the current state.
    ///
    /// The state lets callers tell "nothing yet" from "known unreachable".
    pub fn get_addresses(&self, family: AddressRequest) -> (Vec<AddressEntry>, FetchState) {
        self.get_addresses_at(family, Instant::now())
    }

    pub fn get_addresses_at(
        &self,
        family: AddressRequest,
        now: Instant,
    ) -> (Vec<AddressEntry>, FetchState) {
        let mut inner = self.inner.lock();
        let state = inner.current_state(now);
        let addresses = inner
            .addresses
            .iter()
            .filter(|a| family.matches(&a.ip()))
            .cloned()
            .collect();
        (addresses, state)
    }

    pub fn set_address_rtt(&self, ip: &IpAddr, rtt: Duration) {
        let mut inner = self.inner.lock();
        match inner.address_mut(ip) {
            Some(address) => address.set_rtt(rtt),
            None => trace!(nameserver = %self.key, ip = %ip, "rtt for unknown address ignored"),
        }
    }

    /// Folds a new RTT sample into the smoothed value for `ip`.
    pub fn update_address_rtt(&self, ip: &IpAddr, sample: Duration) {
        let mut inner = self.inner.lock();
        match inner.address_mut(ip) {
            Some(address) => address.update_rtt(sample),
            None => trace!(nameserver = %self.key, ip = %ip, "rtt for unknown address ignored"),
        }
    }

    pub fn set_address_unreachable(&self, ip: &IpAddr) {
        let mut inner = self.inner.lock();
        match inner.address_mut(ip) {
            Some(address) => address.set_unreachable(),
            None => trace!(
                nameserver = %self.key,
                ip = %ip,
                "unreachable mark for unknown address ignored",
            ),
        }
    }

    /// Replaces the addresses of one family from a fresh RRset (new glue,
    /// for example) without waiting for a fetch.
    pub fn refresh_from_rrset(self: &Arc<Self>, rrset: &RecordSet, now: Instant) -> Result<()> {
        let record_type = rrset.record_type();
        if record_type != RecordType::A && record_type != RecordType::AAAA {
            return Err(NsasError::UnexpectedRecordType {
                expected: RecordType::A,
                found: record_type,
            });
        }
        if rrset.dns_class() != self.class() {
            return Err(NsasError::InconsistentClass {
                expected: self.class(),
                found: rrset.dns_class(),
            });
        }
        if HashKey::new(rrset.name(), self.class()) != self.key {
            return Err(NsasError::InconsistentOwnerNames {
                expected: self.name().clone(),
                found: rrset.name().clone(),
            });
        }

        let ready = {
            let mut inner = self.inner.lock();
            let state = inner.current_state(now);
            inner.replace_family(record_type, addresses_of(rrset));
            let expires = self.policy.expires_at(now, rrset.ttl());
            if state == FetchState::Ready {
                inner.lower_expiration(expires);
            } else if state != FetchState::InProgress && !inner.addresses.is_empty() {
                inner.expiration = Some(expires);
                inner.state = FetchState::Ready;
            }
            inner.take_satisfied()
        };
        debug!(nameserver = %self.key, record_type = %record_type, "addresses refreshed");
        for callback in ready {
            callback(self);
        }
        Ok(())
    }

    /// Runs `callback` once addresses of `family` are known or the entry
    /// settled, fetching them through `resolver` if nobody asked yet.
    ///
    /// The callback may run before this returns. Both A and AAAA are always
    /// fetched; `family` only decides when the callback is released.
    pub fn ask_ip(
        self: &Arc<Self>,
        resolver: &dyn Resolver,
        family: AddressRequest,
        callback: NameserverCallback,
    ) {
        self.ask_ip_at(resolver, family, callback, Instant::now())
    }

    pub fn ask_ip_at(
        self: &Arc<Self>,
        resolver: &dyn Resolver,
        family: AddressRequest,
        callback: NameserverCallback,
        now: Instant,
    ) {
        let mut inner = self.inner.lock();
        let state = inner.current_state(now);
        match state {
            FetchState::NotAsked => {
                inner.state = FetchState::InProgress;
                inner.previous = std::mem::take(&mut inner.addresses);
                inner.expiration = None;
                inner.waiting_responses = 2;
                inner.pending.push_back((callback, family));
                drop(inner);

                debug!(nameserver = %self.key, "fetching nameserver addresses");
                for record_type in [RecordType::A, RecordType::AAAA] {
                    let entry = Arc::clone(self);
                    let query = make_query(self.name(), record_type, self.class());
                    resolver.submit(
                        query,
                        completion(
                            move |result| entry.on_answer(record_type, result, Instant::now()),
                        ),
                    );
                }
            }
            FetchState::InProgress if !inner.has_family(family) => {
                inner.pending.push_back((callback, family));
            }
            _ => {
                drop(inner);
                callback(self);
            }
        }
    }

    fn on_answer(
        self: &Arc<Self>,
        record_type: RecordType,
        result: std::result::Result<RecordSet, ResolveError>,
        now: Instant,
    ) {
        let ready = {
            let mut inner = self.inner.lock();
            if inner.state != FetchState::InProgress || inner.waiting_responses == 0 {
                debug!(nameserver = %self.key, record_type = %record_type, "late answer ignored");
                return;
            }
            inner.waiting_responses -= 1;

            match result {
                Ok(rrset) if rrset.dns_class() != self.class() => {
                    warn!(
                        nameserver = %self.key,
                        class = %rrset.dns_class(),
                        "answer class does not match nameserver, discarding"
                    );
                }
                Ok(rrset) => {
                    let fresh = addresses_of(&rrset)
                        .into_iter()
                        .filter(|a| a.is_v4() == (record_type == RecordType::A))
                        .collect::<Vec<_>>();
                    if !fresh.is_empty() {
                        inner.replace_family(record_type, fresh);
                        inner.lower_expiration(self.policy.expires_at(now, rrset.ttl()));
                    }
                }
                Err(err) => {
                    debug!(
                        nameserver = %self.key,
                        record_type = %record_type,
                        error = %err,
                        "address fetch failed",
                    );
                }
            }

            if inner.waiting_responses == 0 {
                inner.previous.clear();
                if inner.addresses.is_empty() {
                    inner.state = FetchState::Unreachable;
                    inner.expiration = Some(self.policy.unreachable_until(now));
                } else {
                    inner.state = FetchState::Ready;
                }
                debug!(
                    nameserver = %self.key,
                    state = ?inner.state,
                    addresses = inner.addresses.len(),
                    "nameserver fetch finished"
                );
            }
            inner.take_satisfied()
        };

        for callback in ready {
            callback(self);
        }
    }
}

fn expect_type(set: &RecordSet, expected: RecordType) -> Result<()> {
    if set.record_type() == expected {
        Ok(())
    } else {
        Err(NsasError::UnexpectedRecordType {
            expected,
            found: set.record_type(),
        })
    }
}

fn addresses_of(set: &RecordSet) -> Vec<AddressEntry> {
    set.records_without_rrsigs()
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .map(AddressEntry::new)
        .collect()
}
