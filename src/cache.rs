//! Selector cache contract and the default unbounded table cache.

use papaya::HashMap;

use crate::computation::Computation;
use crate::key::CacheKey;

/// Mapping from cache key to computation record.
///
/// The engine only requires `get`, `set` and `clear`; `contains` has a
/// provided implementation, and an absent record is always treated as a
/// miss. Replace the default per selector with
/// [`SelectorBuilder::cache`](crate::SelectorBuilder::cache).
pub trait Cache: Send + Sync + 'static {
    /// Look up the record stored under `key`, if any.
    fn get(&self, key: &CacheKey) -> Option<Computation>;

    /// Store `computation` under `key`, replacing any previous record.
    fn set(&self, key: CacheKey, computation: Computation);

    /// Drop every stored record.
    fn clear(&self);

    /// Whether a record is stored under `key`.
    fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }
}

/// Unbounded key-value cache with no eviction; the default.
pub struct TableCache {
    entries: HashMap<CacheKey, Computation, ahash::RandomState>,
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TableCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::with_hasher(ahash::RandomState::new()),
        }
    }
}

impl Cache for TableCache {
    fn get(&self, key: &CacheKey) -> Option<Computation> {
        let pinned = self.entries.pin();
        pinned.get(key).cloned()
    }

    fn set(&self, key: CacheKey, computation: Computation) {
        let pinned = self.entries.pin();
        pinned.insert(key, computation);
    }

    fn clear(&self) {
        let pinned = self.entries.pin();
        pinned.clear();
    }

    fn contains(&self, key: &CacheKey) -> bool {
        let pinned = self.entries.pin();
        pinned.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn table_cache_basic() {
        let cache = TableCache::new();
        let key = CacheKey::Text("5".into());

        assert!(cache.get(&key).is_none());
        assert!(!cache.contains(&key));

        cache.set(key.clone(), Computation::resolved(Arc::new(10i64)));
        assert!(cache.contains(&key));
        assert!(cache.get(&key).is_some());

        cache.clear();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn set_replaces_the_slot() {
        let cache = TableCache::new();
        let key = CacheKey::Empty;

        cache.set(key.clone(), Computation::resolved(Arc::new(1i64)));
        cache.set(key.clone(), Computation::resolved(Arc::new(2i64)));

        let stored = cache.get(&key).and_then(|record| record.result());
        let value = stored.and_then(|result| result.downcast::<i64>().ok());
        assert_eq!(value.as_deref(), Some(&2));
    }
}
