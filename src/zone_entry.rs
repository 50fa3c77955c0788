use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use hickory_proto::rr::{DNSClass, Name, RData, RecordSet, RecordType};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::address_entry::{AddressEntry, AddressRequest};
use crate::cache::EntryCache;
use crate::error::{NsasError, ResolveError, Result};
use crate::fetchable::{FetchState, Fetchable, TtlPolicy};
use crate::hash_key::HashKey;
use crate::nameserver_address::NameserverAddress;
use crate::nameserver_entry::NameserverEntry;
use crate::resolver::{Resolver, completion, make_query};

/// Receives the chosen address, or `None` when the zone has nothing usable.
pub type AddressCallback = Box<dyn FnOnce(Option<NameserverAddress>) + Send + 'static>;

/// A queued lookup. Dropping it unanswered reports `None`, so every caller
/// hears back exactly once.
struct PendingLookup {
    callback: Option<AddressCallback>,
    family: AddressRequest,
}

impl PendingLookup {
    fn new(callback: AddressCallback, family: AddressRequest) -> Self {
        Self {
            callback: Some(callback),
            family,
        }
    }

    fn complete(mut self, result: Option<NameserverAddress>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for PendingLookup {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(None);
        }
    }
}

/// What the candidates can offer for one address family right now.
enum Outcome {
    Selected(NameserverAddress),
    /// Nothing usable yet; these candidates are still fetching or not asked.
    Waiting(Vec<Arc<NameserverEntry>>),
    Exhausted,
}

/// A zone and the nameservers that serve it.
pub struct ZoneEntry {
    key: HashKey,
    policy: TtlPolicy,
    resolver: Arc<dyn Resolver>,
    nameservers: Arc<EntryCache<NameserverEntry>>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: FetchState,
    expiration: Option<Instant>,
    candidates: Vec<Arc<NameserverEntry>>,
    // InProgress covers both the NS fetch and waiting on candidates; this
    // tells them apart.
    fetching_ns: bool,
    pending: VecDeque<PendingLookup>,
    // (nameserver, family) pairs we already hold an ask_ip callback on.
    watching: FxHashSet<(HashKey, AddressRequest)>,
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

impl ZoneEntry {
    /// A zone whose nameservers are not known yet; the first lookup asks
    /// the resolver for its NS set.
    pub fn new(
        zone: &Name,
        class: DNSClass,
        resolver: Arc<dyn Resolver>,
        nameservers: Arc<EntryCache<NameserverEntry>>,
        policy: TtlPolicy,
    ) -> Self {
        Self {
            key: HashKey::new(zone, class),
            policy,
            resolver,
            nameservers,
            inner: Mutex::new(Inner {
                state: FetchState::NotAsked,
                expiration: None,
                candidates: Vec::new(),
                fetching_ns: false,
                pending: VecDeque::new(),
                watching: FxHashSet::default(),
            }),
        }
    }

    /// A zone seeded from a referral's NS set, ready without an NS query.
    pub fn from_referral(
        ns_set: &RecordSet,
        resolver: Arc<dyn Resolver>,
        nameservers: Arc<EntryCache<NameserverEntry>>,
        policy: TtlPolicy,
        now: Instant,
    ) -> Result<Self> {
        if ns_set.record_type() != RecordType::NS {
            return Err(NsasError::UnexpectedRecordType {
                expected: RecordType::NS,
                found: ns_set.record_type(),
            });
        }
        let zone = Self::new(ns_set.name(), ns_set.dns_class(), resolver, nameservers, policy);
        let candidates = zone.candidates_from(ns_set);
        {
            let mut inner = zone.inner.lock();
            if candidates.is_empty() {
                inner.state = FetchState::Unreachable;
                inner.expiration = Some(policy.unreachable_until(now));
            } else {
                inner.candidates = candidates;
                inner.state = FetchState::Ready;
                inner.expiration = Some(policy.expires_at(now, ns_set.ttl()));
            }
        }
        Ok(zone)
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

    pub fn state(&self) -> FetchState {
        self.inner.lock().current_state(Instant::now())
    }

    pub fn candidates(&self) -> Vec<Arc<NameserverEntry>> {
        self.inner.lock().candidates.clone()
    }

    /// The best address among the zone's ready nameservers, if any.
    pub fn select_nameserver(&self, family: AddressRequest) -> Option<NameserverAddress> {
        let candidates = self.candidates();
        select_among(&candidates, family, Instant::now())
    }

    /// Delivers an address of `family` to `callback`, fetching the zone's
    /// nameservers and their addresses as needed.
    ///
    /// The callback runs exactly once, possibly before this returns.
    pub fn add_callback(self: &Arc<Self>, family: AddressRequest, callback: AddressCallback) {
        self.add_callback_at(family, callback, Instant::now())
    }

    pub fn add_callback_at(
        self: &Arc<Self>,
        family: AddressRequest,
        callback: AddressCallback,
        now: Instant,
    ) {
        let lookup = PendingLookup::new(callback, family);
        let mut inner = self.inner.lock();
        let state = inner.current_state(now);
        match state {
            FetchState::NotAsked => {
                inner.state = FetchState::InProgress;
                inner.expiration = None;
                inner.candidates.clear();
                inner.watching.clear();
                inner.fetching_ns = true;
                inner.pending.push_back(lookup);
                drop(inner);
                self.fetch_nameservers();
            }
            FetchState::InProgress if inner.fetching_ns => inner.pending.push_back(lookup),
            FetchState::InProgress | FetchState::Ready => {
                inner.pending.push_back(lookup);
                drop(inner);
                self.process(now);
            }
            FetchState::Unreachable => {
                drop(inner);
                trace!(zone = %self.key, "zone unreachable, no address");
                lookup.complete(None);
            }
        }
    }

    fn fetch_nameservers(self: &Arc<Self>) {
        debug!(zone = %self.key, "fetching zone nameservers");
        let zone = Arc::clone(self);
        let query = make_query(self.name(), RecordType::NS, self.class());
        self.resolver.submit(
            query,
            completion(move |result| zone.on_nameservers(result, Instant::now())),
        );
    }

    fn on_nameservers(
        self: &Arc<Self>,
        result: std::result::Result<RecordSet, ResolveError>,
        now: Instant,
    ) {
        let (candidates, ttl) = match result {
            Ok(rrset) if rrset.dns_class() == self.class() => {
                (self.candidates_from(&rrset), rrset.ttl())
            }
            Ok(rrset) => {
                debug!(zone = %self.key, class = %rrset.dns_class(), "NS answer in wrong class");
                (Vec::new(), 0)
            }
            Err(err) => {
                debug!(zone = %self.key, error = %err, "NS fetch failed");
                (Vec::new(), 0)
            }
        };

        {
            let mut inner = self.inner.lock();
            if inner.state != FetchState::InProgress || !inner.fetching_ns {
                return;
            }
            inner.fetching_ns = false;
            if candidates.is_empty() {
                inner.state = FetchState::Unreachable;
                inner.expiration = Some(self.policy.unreachable_until(now));
            } else {
                inner.candidates = candidates;
                inner.state = FetchState::Ready;
                inner.expiration = Some(self.policy.expires_at(now, ttl));
            }
            debug!(
                zone = %self.key,
                state = ?inner.state,
                nameservers = inner.candidates.len(),
                "zone nameservers known"
            );
        }
        self.process(now);
    }

    /// Looks up (or creates) the nameserver entries an NS set points at.
    fn candidates_from(&self, ns_set: &RecordSet) -> Vec<Arc<NameserverEntry>> {
        let class = self.class();
        let mut seen = FxHashSet::default();
        ns_set
            .records_without_rrsigs()
            .filter_map(|record| match record.data() {
                Some(RData::NS(ns)) => Some(ns.0.clone()),
                _ => None,
            })
            .filter(|name| seen.insert(HashKey::new(name, class)))
            .map(|name| {
                let key = HashKey::new(&name, class);
                self.nameservers
                    .get_or_create(&key, || NameserverEntry::new(&name, class, self.policy))
            })
            .collect()
    }

    /// Answers whatever queued lookups can be answered and asks the
    /// nameservers that are still needed.
    fn process(self: &Arc<Self>, now: Instant) {
        let mut answers = Vec::new();
        let mut to_ask = Vec::new();
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match inner.state {
                FetchState::Unreachable => {
                    answers.extend(inner.pending.drain(..).map(|lookup| (lookup, None)));
                }
                FetchState::NotAsked => {}
                FetchState::InProgress if inner.fetching_ns => {}
                FetchState::Ready | FetchState::InProgress => {
                    let mut outcomes: HashMap<AddressRequest, Outcome> = HashMap::new();
                    let mut any_exhausted = false;
                    for lookup in std::mem::take(&mut inner.pending) {
                        let family = lookup.family;
                        let outcome = outcomes
                            .entry(family)
                            .or_insert_with(|| classify(&inner.candidates, family, now));
                        match outcome {
                            Outcome::Selected(address) => {
                                answers.push((lookup, Some(address.clone())))
                            }
                            Outcome::Waiting(waiting) => {
                                for ns in waiting.iter() {
                                    if inner.watching.insert((ns.hash_key().clone(), family)) {
                                        to_ask.push((Arc::clone(ns), family));
                                    }
                                }
                                inner.pending.push_back(lookup);
                            }
                            Outcome::Exhausted => {
                                any_exhausted = true;
                                answers.push((lookup, None));
                            }
                        }
                    }
                    let offering = outcomes.values().any(|o| matches!(o, Outcome::Selected(_)));
                    if any_exhausted
                        && inner.pending.is_empty()
                        && matches!(
                            classify(&inner.candidates, AddressRequest::Any, now),
                            Outcome::Exhausted
                        )
                    {
                        debug!(zone = %self.key, "no reachable nameserver left, zone unreachable");
                        inner.state = FetchState::Unreachable;
                        inner.expiration = Some(self.policy.unreachable_until(now));
                    } else if !inner.pending.is_empty() && !offering {
                        trace!(zone = %self.key, "waiting on nameserver addresses");
                        inner.state = FetchState::InProgress;
                    } else {
                        inner.state = FetchState::Ready;
                    }
                }
            }
        }

        for (lookup, result) in answers {
            lookup.complete(result);
        }

        for (ns, family) in to_ask {
            let zone = Arc::clone(self);
            let watched = (ns.hash_key().clone(), family);
            ns.ask_ip_at(
                self.resolver.as_ref(),
                family,
                Box::new(move |_: &Arc<NameserverEntry>| {
                    zone.inner.lock().watching.remove(&watched);
                    zone.process(Instant::now());
                }),
                now,
            );
        }
    }
}

/// Picks the lowest-RTT reachable address of `family` among the ready
/// `candidates`; ties go to the earlier candidate.
///
/// A candidate counts as ready once it settled, or while still fetching if
/// addresses of `family` already arrived. An expired candidate is not ready.
pub fn select_among(
    candidates: &[Arc<NameserverEntry>],
    family: AddressRequest,
    now: Instant,
) -> Option<NameserverAddress> {
    match classify(candidates, family, now) {
        Outcome::Selected(address) => Some(address),
        Outcome::Waiting(_) | Outcome::Exhausted => None,
    }
}

fn classify(candidates: &[Arc<NameserverEntry>], family: AddressRequest, now: Instant) -> Outcome {
    let mut best: Option<(&Arc<NameserverEntry>, AddressEntry)> = None;
    let mut waiting = Vec::new();

    for ns in candidates {
        let (addresses, state) = ns.get_addresses_at(family, now);
        let ready = state.is_terminal()
            || (state == FetchState::InProgress && !addresses.is_empty());
        if !ready {
            waiting.push(Arc::clone(ns));
            continue;
        }
        let fastest = addresses
            .into_iter()
            .filter(|a| !a.is_unreachable())
            .min_by_key(AddressEntry::rtt);
        if let Some(address) = fastest {
            let better = best.as_ref().is_none_or(|(_, current)| address.rtt() < current.rtt());
            if better {
                best = Some((ns, address));
            }
        }
    }

    match best {
        Some((ns, address)) => Outcome::Selected(NameserverAddress::new(Arc::clone(ns), address)),
        None if !waiting.is_empty() => Outcome::Waiting(waiting),
        None => Outcome::Exhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedResolver, address_set, name_of, ns_set};
    use std::net::IpAddr;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    type Results = Arc<Mutex<Vec<Option<IpAddr>>>>;

    fn nameserver_cache() -> Arc<EntryCache<NameserverEntry>> {
        Arc::new(EntryCache::new(NonZeroUsize::new(64).unwrap()))
    }

    fn recorder() -> (Results, impl Fn() -> AddressCallback) {
        let results: Results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let make = move || -> AddressCallback {
            let sink = Arc::clone(&sink);
            Box::new(
                move |found: Option<NameserverAddress>| sink.lock().push(found.map(|a| a.ip())),
            )
        };
        (results, make)
    }

    fn ready_nameserver(name: &str, ip: &str, rtt_ms: u64) -> Arc<NameserverEntry> {
        let set = address_set(name, 300, &[ip]);
        let now = Instant::now();
        let ns = NameserverEntry::from_rrsets(Some(&set), None, TtlPolicy::default(), now).unwrap();
        ns.set_address_rtt(&ip.parse().unwrap(), Duration::from_millis(rtt_ms));
        Arc::new(ns)
    }

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn lowest_rtt_candidate_wins() {
        let candidates = vec![
            ready_nameserver("ns1.example.", "192.0.2.1", 50),
            ready_nameserver("ns2.example.", "192.0.2.2", 10),
            ready_nameserver("ns3.example.", "192.0.2.3", 30),
        ];
        let chosen =
            select_among(&candidates, AddressRequest::Any, Instant::now()).expect("a candidate");
        assert_eq!(chosen.nameserver().name(), &name_of("ns2.example."));
        assert_eq!(chosen.address().rtt(), Duration::from_millis(10));
    }

    #[test]
    fn ties_go_to_the_first_candidate() {
        let candidates = vec![
            ready_nameserver("ns1.example.", "192.0.2.1", 20),
            ready_nameserver("ns2.example.", "192.0.2.2", 20),
        ];
        let chosen = select_among(&candidates, AddressRequest::Any, Instant::now()).unwrap();
        assert_eq!(chosen.ip(), "192.0.2.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn unreachable_and_unfetched_candidates_are_skipped() {
        let down = ready_nameserver("ns1.example.", "192.0.2.1", 1);
        down.set_address_unreachable(&"192.0.2.1".parse().unwrap());
        let unknown = Arc::new(
            NameserverEntry::new(&name_of("ns2.example."), DNSClass::IN, TtlPolicy::default()),
        );
        let slow = ready_nameserver("ns3.example.", "192.0.2.3", 90);

        let candidates = vec![down, unknown, slow];
        let chosen = select_among(&candidates, AddressRequest::V4Only, Instant::now()).unwrap();
        assert_eq!(chosen.ip(), "192.0.2.3".parse::<IpAddr>().unwrap());
        assert!(select_among(&candidates, AddressRequest::V6Only, Instant::now()).is_none());
    }

    #[test]
    fn first_lookup_fetches_ns_then_addresses() {
        let resolver = Arc::new(ScriptedResolver::new());
        let zone = Arc::new(ZoneEntry::new(
            &name_of("example."),
            DNSClass::IN,
            resolver.clone(),
            nameserver_cache(),
            TtlPolicy::default(),
        ));
        let (results, callback) = recorder();

        zone.add_callback(AddressRequest::Any, callback());
        zone.add_callback(AddressRequest::Any, callback());
        assert_eq!(resolver.submitted(), 1, "one NS query for both lookups");
        assert_eq!(zone.state(), FetchState::InProgress);

        let referral = ns_set("example.", 3600, &["ns1.example.", "ns2.example."]);
        resolver.answer("example.", RecordType::NS, Ok(referral));
        // Nothing is ready, so both nameservers are asked for A and AAAA and
        // the zone waits on them.
        assert_eq!(resolver.submitted(), 5);
        assert!(results.lock().is_empty());
        assert_eq!(zone.state(), FetchState::InProgress);

        // A lookup arriving meanwhile queues without new queries.
        zone.add_callback(AddressRequest::Any, callback());
        assert_eq!(resolver.submitted(), 5);

        let ns2 = address_set("ns2.example.", 300, &["192.0.2.2"]);
        resolver.answer("ns2.example.", RecordType::A, Ok(ns2));
        assert_eq!(*results.lock(), vec![ip("192.0.2.2"); 3]);
        assert_eq!(zone.state(), FetchState::Ready);
    }

    #[test]
    fn expired_nameserver_is_fetched_again() {
        let resolver = Arc::new(ScriptedResolver::new());
        let nameservers = nameserver_cache();
        let now = Instant::now();
        let ns1 = name_of("ns1.example.");
        nameservers.get_or_create(&HashKey::new(&ns1, DNSClass::IN), || {
            let set = address_set("ns1.example.", 60, &["192.0.2.1"]);
            NameserverEntry::from_rrsets(Some(&set), None, TtlPolicy::default(), now).unwrap()
        });
        let referral = ns_set("example.", 3600, &["ns1.example."]);
        let zone = Arc::new(
            ZoneEntry::from_referral(
                &referral,
                resolver.clone(),
                nameservers,
                TtlPolicy::default(),
                now,
            )
                .unwrap(),
        );
        let (results, callback) = recorder();

        // Past the address TTL but well within the zone's.
        zone.add_callback_at(AddressRequest::Any, callback(), now + Duration::from_secs(120));
        assert!(results.lock().is_empty(), "stale address handed out");
        assert_eq!(resolver.submitted(), 2);
        assert!(resolver.is_pending("ns1.example.", RecordType::A));
        assert!(!resolver.is_pending("example.", RecordType::NS));

        let fresh = address_set("ns1.example.", 60, &["192.0.2.9"]);
        resolver.answer("ns1.example.", RecordType::A, Ok(fresh));
        assert_eq!(*results.lock(), vec![ip("192.0.2.9")]);
    }

    #[test]
    fn ready_candidate_prevents_fan_out() {
        let resolver = Arc::new(ScriptedResolver::new());
        let nameservers = nameserver_cache();
        let ns1 = name_of("ns1.example.");
        nameservers.get_or_create(&HashKey::new(&ns1, DNSClass::IN), || {
            let set = address_set("ns1.example.", 300, &["192.0.2.1"]);
            NameserverEntry::from_rrsets(Some(&set), None, TtlPolicy::default(), Instant::now())
                .unwrap()
        });

        let referral = ns_set("example.", 3600, &["ns1.example.", "ns2.example."]);
        let zone = Arc::new(
            ZoneEntry::from_referral(
                &referral,
                resolver.clone(),
                nameservers,
                TtlPolicy::default(),
                Instant::now(),
            )
                .unwrap(),
        );
        let (results, callback) = recorder();
        zone.add_callback(AddressRequest::V4Only, callback());

        assert_eq!(*results.lock(), vec![ip("192.0.2.1")]);
        assert_eq!(resolver.submitted(), 0);
    }

    #[test]
    fn v6_request_waits_past_v4_answer() {
        let resolver = Arc::new(ScriptedResolver::new());
        let referral = ns_set("example.", 3600, &["ns1.example."]);
        let zone = Arc::new(
            ZoneEntry::from_referral(
                &referral,
                resolver.clone(),
                nameserver_cache(),
                TtlPolicy::default(),
                Instant::now(),
            )
                .unwrap(),
        );
        let (results, callback) = recorder();
        zone.add_callback(AddressRequest::V6Only, callback());

        resolver.answer(
            "ns1.example.",
            RecordType::A,
            Ok(address_set("ns1.example.", 300, &["192.0.2.1"])),
        );
        assert!(results.lock().is_empty());

        resolver.answer(
            "ns1.example.",
            RecordType::AAAA,
            Ok(address_set("ns1.example.", 300, &["2001:db8::53"])),
        );
        assert_eq!(*results.lock(), vec![ip("2001:db8::53")]);
    }

    #[test]
    fn family_without_addresses_answers_none_but_zone_stays_ready() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.can(
            "ns1.example.",
            RecordType::A,
            Ok(address_set("ns1.example.", 300, &["192.0.2.1"])),
        );
        resolver.can("ns1.example.", RecordType::AAAA, Err(ResolveError::NoData(RecordType::AAAA)));
        let referral = ns_set("example.", 3600, &["ns1.example."]);
        let zone = Arc::new(
            ZoneEntry::from_referral(
                &referral,
                resolver.clone(),
                nameserver_cache(),
                TtlPolicy::default(),
                Instant::now(),
            )
                .unwrap(),
        );
        let (results, callback) = recorder();
        zone.add_callback(AddressRequest::V6Only, callback());
        zone.add_callback(AddressRequest::V4Only, callback());

        assert_eq!(*results.lock(), vec![None, ip("192.0.2.1")]);
        assert_eq!(zone.state(), FetchState::Ready);
    }

    #[test]
    fn all_nameservers_down_makes_zone_unreachable() {
        let resolver = Arc::new(ScriptedResolver::new());
        for name in ["ns1.example.", "ns2.example."] {
            resolver.can(name, RecordType::A, Err(ResolveError::Timeout));
            resolver.can(name, RecordType::AAAA, Err(ResolveError::Timeout));
        }
        let referral = ns_set("example.", 3600, &["ns1.example.", "ns2.example."]);
        let zone = Arc::new(
            ZoneEntry::from_referral(
                &referral,
                resolver.clone(),
                nameserver_cache(),
                TtlPolicy::default(),
                Instant::now(),
            )
                .unwrap(),
        );
        let (results, callback) = recorder();
        zone.add_callback(AddressRequest::Any, callback());
        assert_eq!(*results.lock(), vec![None]);
        assert_eq!(zone.state(), FetchState::Unreachable);

        zone.add_callback(AddressRequest::Any, callback());
        assert_eq!(*results.lock(), vec![None, None]);
        assert_eq!(resolver.submitted(), 4);
    }

    #[test]
    fn failed_ns_fetch_answers_none() {
        let resolver = Arc::new(ScriptedResolver::new());
        let zone = Arc::new(ZoneEntry::new(
            &name_of("example."),
            DNSClass::IN,
            resolver.clone(),
            nameserver_cache(),
            TtlPolicy::default(),
        ));
        let (results, callback) = recorder();
        zone.add_callback(AddressRequest::Any, callback());
        resolver.answer("example.", RecordType::NS, Err(ResolveError::Timeout));
        assert_eq!(*results.lock(), vec![None]);
        assert_eq!(zone.state(), FetchState::Unreachable);
    }

    #[test]
    fn expired_zone_asks_for_ns_again() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.can(
            "ns1.example.",
            RecordType::A,
            Ok(address_set("ns1.example.", 300, &["192.0.2.1"])),
        );
        resolver.can("ns1.example.", RecordType::AAAA, Err(ResolveError::NoData(RecordType::AAAA)));
        let now = Instant::now();
        let referral = ns_set("example.", 60, &["ns1.example."]);
        let zone = Arc::new(
            ZoneEntry::from_referral(
                &referral,
                resolver.clone(),
                nameserver_cache(),
                TtlPolicy::default(),
                now,
            )
                .unwrap(),
        );
        let (results, callback) = recorder();
        zone.add_callback_at(AddressRequest::Any, callback(), now + Duration::from_secs(61));
        assert!(resolver.is_pending("example.", RecordType::NS));
        assert!(results.lock().is_empty());

        resolver.answer("example.", RecordType::NS, Ok(ns_set("example.", 60, &["ns1.example."])));
        assert_eq!(*results.lock(), vec![ip("192.0.2.1")]);
    }

    #[test]
    fn abandoned_queries_still_answer_the_caller() {
        let resolver = Arc::new(ScriptedResolver::new());
        let zone = Arc::new(ZoneEntry::new(
            &name_of("example."),
            DNSClass::IN,
            resolver.clone(),
            nameserver_cache(),
            TtlPolicy::default(),
        ));
        let (results, callback) = recorder();
        zone.add_callback(AddressRequest::Any, callback());
        resolver.abandon_all();
        assert_eq!(*results.lock(), vec![None]);
    }

    #[test]
    fn referral_must_be_an_ns_set() {
        let resolver = Arc::new(ScriptedResolver::new());
        let not_ns = address_set("example.", 300, &["192.0.2.1"]);
        let err = ZoneEntry::from_referral(
            &not_ns,
            resolver,
            nameserver_cache(),
            TtlPolicy::default(),
            Instant::now(),
        )
            .err()
            .expect("A set is not a referral");
        assert!(matches!(err, NsasError::UnexpectedRecordType { .. }));
    }
}
