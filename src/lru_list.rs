use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// Recency order of a bounded cache.
///
/// Only keys live here; whoever owns the values drops them when `touch`
/// hands back an evicted key.
pub struct LruList<K: Hash + Eq> {
    order: Mutex<LruCache<K, ()>>,
}

impl<K: Hash + Eq + Clone> LruList<K> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            order: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Moves `key` to the most-recently-used position, adding it if absent.
    ///
    /// Returns the least-recently-used key when adding overflowed the list.
    pub fn touch(&self, key: &K) -> Option<K> {
        let mut order = self.order.lock();
        if order.get(key).is_some() {
            return None;
        }
        order.push(key.clone(), ()).map(|(evicted, _)| evicted)
    }
}

#[cfg(test)]
impl<K: Hash + Eq + Clone> LruList<K> {
    fn remove(&self, key: &K) -> bool {
        self.order.lock().pop(key).is_some()
    }

    fn contains(&self, key: &K) -> bool {
        self.order.lock().contains(key)
    }

    /// The key that the next overflow would evict.
    fn oldest(&self) -> Option<K> {
        self.order.lock().peek_lru().map(|(key, _)| key.clone())
    }

    fn len(&self) -> usize {
        self.order.lock().len()
    }
}
