use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;

/// Owning keyed store of shared entries.
///
/// Sharded locking keeps lookups independent of each other and of the
/// entries' own locks.
pub struct HashIndex<K: Hash + Eq, T> {
    map: DashMap<K, Arc<T>, FxBuildHasher>,
}

impl<K: Hash + Eq, T> HashIndex<K, T> {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Returns the entry for `key`, constructing it with `factory` on a miss.
    ///
    /// The factory runs while the key's shard is locked, so concurrent
    /// callers for one key always get the same `Arc`. It must not call back
    /// into this index. The flag is true when this call did the insert.
    pub fn find_or_insert<F>(&self, key: K, factory: F) -> (Arc<T>, bool)
    where
        F: FnOnce() -> T,
    {
        match self.map.entry(key) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let value = Arc::new(factory());
                entry.insert(Arc::clone(&value));
                (value, true)
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        self.map.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, key: &K) -> Option<Arc<T>> {
        self.map.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
