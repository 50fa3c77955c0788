use std::fmt;

use hickory_proto::rr::{DNSClass, Name};

/// Index key for both caches: owner name plus class.
///
/// The name is stored lowercased and fully qualified so that
/// `NS1.Example` and `ns1.example.` land on the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashKey {
    name: Name,
    class: DNSClass,
}

impl HashKey {
    pub fn new(name: &Name, class: DNSClass) -> Self {
        let mut name = name.to_lowercase();
        name.set_fqdn(true);
        Self { name, class }
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn class(&self) -> DNSClass {
        self.class
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.class)
    }
}
