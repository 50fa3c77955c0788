use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::trace;

use crate::hash_index::HashIndex;
use crate::hash_key::HashKey;
use crate::lru_list::LruList;

/// A bounded cache of shared entries: the index owns, the list orders.
///
/// Eviction only drops the index's `Arc`; anyone still holding the entry
/// keeps using it, but the next lookup for the key starts from scratch.
pub struct EntryCache<T> {
    index: HashIndex<HashKey, T>,
    lru: LruList<HashKey>,
}

impl<T> EntryCache<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            index: HashIndex::new(),
            lru: LruList::new(capacity),
        }
    }

    /// Looks `key` up, creating the entry with `factory` on a miss, and marks
    /// it most recently used.
    pub fn get_or_create<F>(&self, key: &HashKey, factory: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let (entry, inserted) = self.index.find_or_insert(key.clone(), factory);
        if inserted {
            trace!(key = %key, "cache miss, entry created");
        }
        if let Some(evicted) = self.lru.touch(key) {
            // A racing lookup may have re-added an evicted key to the list;
            // its entry is then simply recreated on the next miss.
            if self.index.remove(&evicted).is_some() {
                trace!(key = %evicted, "evicted least recently used entry");
            }
        }
        entry
    }

    /// Returns the entry without creating it or changing recency.
    pub fn get(&self, key: &HashKey) -> Option<Arc<T>> {
        self.index.get(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
