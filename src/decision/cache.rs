//! Bounded LRU cache of decision responses
//!
//! Maps a context fingerprint to previously obtained decision text so a
//! repeated context never costs a second service call, regardless of
//! which tick first produced it. Reads count as accesses; inserting past
//! capacity evicts the least-recently-accessed entry. All mutation is
//! serialized behind one lock, which is never held across an await.

use crate::core::types::Tick;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug)]
struct CacheEntry {
    text: String,
    /// Access-order stamp; larger is more recent
    stamp: u64,
    /// Tick the entry was first stored (for staleness policies)
    inserted_tick: Tick,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: AHashMap<u64, CacheEntry>,
    /// stamp -> fingerprint, ordered oldest-first
    order: BTreeMap<u64, u64>,
    clock: u64,
}

pub struct ResponseCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Look up a fingerprint, refreshing its recency on hit.
    pub fn get(&self, fingerprint: u64) -> Option<String> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let CacheInner {
            entries,
            order,
            clock,
        } = &mut *inner;

        let entry = entries.get_mut(&fingerprint)?;
        order.remove(&entry.stamp);
        *clock += 1;
        entry.stamp = *clock;
        order.insert(*clock, fingerprint);
        Some(entry.text.clone())
    }

    /// Insert or refresh an entry, evicting the least-recently-accessed
    /// one if the cache is full.
    pub fn put(&self, fingerprint: u64, text: &str, tick: Tick) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.clock += 1;
        let stamp = inner.clock;

        if let Some(entry) = inner.entries.get_mut(&fingerprint) {
            let old_stamp = entry.stamp;
            entry.text = text.to_owned();
            entry.stamp = stamp;
            inner.order.remove(&old_stamp);
            inner.order.insert(stamp, fingerprint);
            return;
        }

        if inner.entries.len() >= self.capacity {
            if let Some((_, evicted)) = inner.order.pop_first() {
                inner.entries.remove(&evicted);
            }
        }

        inner.entries.insert(
            fingerprint,
            CacheEntry {
                text: text.to_owned(),
                stamp,
                inserted_tick: tick,
            },
        );
        inner.order.insert(stamp, fingerprint);
    }

    /// Tick an entry was first stored, if present. Does not refresh recency.
    pub fn inserted_tick(&self, fingerprint: u64) -> Option<Tick> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.get(&fingerprint).map(|e| e.inserted_tick)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_put_then_get() {
        let cache = ResponseCache::new(10);
        cache.put(1, "rest", 0);
        assert_eq!(cache.get(1), Some("rest".into()));
        assert_eq!(cache.get(2), None);
    }

    #[test]
    fn test_eviction_is_least_recently_accessed() {
        let cache = ResponseCache::new(3);
        cache.put(1, "a", 0);
        cache.put(2, "b", 0);
        cache.put(3, "c", 0);

        // Touch 1 so 2 is now the least recently accessed.
        assert!(cache.get(1).is_some());

        cache.put(4, "d", 1);
        assert_eq!(cache.get(2), None);
        assert!(cache.get(1).is_some());
        assert!(cache.get(3).is_some());
        assert!(cache.get(4).is_some());
    }

    #[test]
    fn test_exact_eviction_sequence() {
        // Fill to capacity, then insert without re-access: evictions
        // proceed in insertion order.
        let cache = ResponseCache::new(3);
        for fp in 1..=3 {
            cache.put(fp, "x", 0);
        }
        cache.put(4, "x", 0);
        assert_eq!(cache.get(1), None);
        cache.put(5, "x", 0);
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_reinsert_refreshes_recency() {
        let cache = ResponseCache::new(2);
        cache.put(1, "a", 0);
        cache.put(2, "b", 0);
        cache.put(1, "a2", 1);
        cache.put(3, "c", 1);

        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(1), Some("a2".into()));
    }

    #[test]
    fn test_inserted_tick_survives_update_of_recency() {
        let cache = ResponseCache::new(2);
        cache.put(1, "a", 5);
        assert!(cache.get(1).is_some());
        assert_eq!(cache.inserted_tick(1), Some(5));
    }

    proptest! {
        /// The cache agrees with a naive model: same hits, same
        /// contents, never over capacity.
        #[test]
        fn prop_matches_naive_lru(ops in prop::collection::vec((0u64..8, prop::bool::ANY), 1..200)) {
            const CAPACITY: usize = 4;
            let cache = ResponseCache::new(CAPACITY);
            // Naive model: vector of (fingerprint, text), most recent last.
            let mut model: Vec<(u64, String)> = Vec::new();

            for (i, (fp, is_put)) in ops.into_iter().enumerate() {
                if is_put {
                    let text = format!("v{}", i);
                    cache.put(fp, &text, 0);
                    model.retain(|(f, _)| *f != fp);
                    if model.len() >= CAPACITY {
                        model.remove(0);
                    }
                    model.push((fp, text));
                } else {
                    let expected = model.iter().position(|(f, _)| *f == fp);
                    let got = cache.get(fp);
                    match expected {
                        Some(pos) => {
                            let (f, text) = model.remove(pos);
                            prop_assert_eq!(got.as_deref(), Some(text.as_str()));
                            model.push((f, text));
                        }
                        None => prop_assert!(got.is_none()),
                    }
                }
                prop_assert!(cache.len() <= CAPACITY);
                prop_assert_eq!(cache.len(), model.len());
            }
        }
    }
}
