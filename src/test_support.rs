//! In-memory resolver used by the unit tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use hickory_proto::op::Query;
use hickory_proto::rr::rdata::{A, AAAA, NS};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordSet, RecordType};
use parking_lot::Mutex;

use crate::error::ResolveError;
use crate::hash_key::HashKey;
use crate::resolver::{Completion, Resolver};

type Answer = Result<RecordSet, ResolveError>;

/// Holds queries until the test answers them, unless a canned answer was
/// registered up front, in which case the completion runs synchronously.
#[derive(Default)]
pub(crate) struct ScriptedResolver {
    canned: Mutex<HashMap<(HashKey, RecordType), Answer>>,
    pending: Mutex<Vec<(Query, Completion)>>,
    submitted: AtomicUsize,
}

impl ScriptedResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub(crate) fn is_pending(&self, name: &str, record_type: RecordType) -> bool {
        let key = HashKey::new(&name_of(name), DNSClass::IN);
        self.pending
            .lock()
            .iter()
            .any(|(q, _)| {
                HashKey::new(q.name(), q.query_class()) == key && q.query_type() == record_type
            })
    }

    /// Answers every later query for `name`/`record_type` immediately.
    pub(crate) fn can(&self, name: &str, record_type: RecordType, answer: Answer) {
        let key = HashKey::new(&name_of(name), DNSClass::IN);
        self.canned.lock().insert((key, record_type), answer);
    }

    /// Completes the oldest pending query for `name`/`record_type`.
    ///
    /// Returns false when no such query is outstanding.
    pub(crate) fn answer(&self, name: &str, record_type: RecordType, answer: Answer) -> bool {
        let key = HashKey::new(&name_of(name), DNSClass::IN);
        let completion = {
            let mut pending = self.pending.lock();
            let pos = pending.iter().position(|(q, _)| {
                HashKey::new(q.name(), q.query_class()) == key && q.query_type() == record_type
            });
            match pos {
                Some(pos) => pending.remove(pos).1,
                None => return false,
            }
        };
        completion(answer);
        true
    }

    /// Drops every pending completion without running it.
    pub(crate) fn abandon_all(&self) {
        let dropped = std::mem::take(&mut *self.pending.lock());
        drop(dropped);
    }
}

impl Resolver for ScriptedResolver {
    fn submit(&self, query: Query, completion: Completion) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let key = HashKey::new(query.name(), query.query_class());
        let canned = self.canned.lock().get(&(key, query.query_type())).cloned();
        match canned {
            Some(answer) => completion(answer),
            None => self.pending.lock().push((query, completion)),
        }
    }
}

pub(crate) fn name_of(name: &str) -> Name {
    Name::from_str(name).expect("valid test name")
}

pub(crate) fn address_set(name: &str, ttl: u32, ips: &[&str]) -> RecordSet {
    let owner = name_of(name);
    let first: Option<IpAddr> = ips.first().map(|ip| ip.parse().expect("valid test ip"));
    let record_type = match first {
        Some(IpAddr::V6(_)) => RecordType::AAAA,
        _ => RecordType::A,
    };
    let mut rrset = RecordSet::with_ttl(owner.clone(), record_type, ttl);
    for ip in ips {
        let rdata = match ip.parse::<IpAddr>().expect("valid test ip") {
            IpAddr::V4(v4) => RData::A(A(v4)),
            IpAddr::V6(v6) => RData::AAAA(AAAA(v6)),
        };
        rrset.insert(Record::from_rdata(owner.clone(), ttl, rdata), 0);
    }
    rrset
}

pub(crate) fn empty_set(name: &str, record_type: RecordType) -> RecordSet {
    RecordSet::with_ttl(name_of(name), record_type, 300)
}

pub(crate) fn ns_set(zone: &str, ttl: u32, targets: &[&str]) -> RecordSet {
    let owner = name_of(zone);
    let mut rrset = RecordSet::with_ttl(owner.clone(), RecordType::NS, ttl);
    for target in targets {
        let rdata = RData::NS(NS(name_of(target)));
        rrset.insert(Record::from_rdata(owner.clone(), ttl, rdata), 0);
    }
    rrset
}
