//! `RenderCache` (§4.11): a FIFO-bounded `path+fingerprint → bytes` map
//! shared by SSG, ISR, and PPR shells, plus the ISR in-flight revalidation
//! set. Grounded on `rt-ui-log::UiLogger`'s ring-buffer eviction (`VecDeque`
//! + pop-front-while-over-capacity), generalized from log lines to cached
//! render output.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bytes: std::sync::Arc<Vec<u8>>,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

/// `max_entries` of `-1` means unbounded, matching the spec's own encoding.
pub struct RenderCache {
    max_entries: i64,
    inner: Mutex<Inner>,
}

impl RenderCache {
    pub fn new(max_entries: i64) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().unwrap().entries.get(key).cloned()
    }

    /// Inserts `bytes` under `key`, evicting the oldest entries if the
    /// cache is at capacity. Returns the keys evicted as a result, so the
    /// caller can emit a [`super::RenderEvent::Evicted`] per eviction.
    pub fn insert(&self, key: String, bytes: Vec<u8>) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(&key) {
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(
            key,
            CacheEntry {
                bytes: std::sync::Arc::new(bytes),
                created_at: Instant::now(),
            },
        );
        self.evict_over_capacity(&mut inner)
    }

    fn evict_over_capacity(&self, inner: &mut Inner) -> Vec<String> {
        if self.max_entries < 0 {
            return Vec::new();
        }
        let mut evicted = Vec::new();
        while inner.entries.len() as i64 > self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                    evicted.push(oldest);
                }
                None => break,
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-key compare-and-set guard so at most one ISR revalidation for a
/// given route runs at a time (§4.10's ISR dedup, testable property 11).
#[derive(Default)]
pub struct InFlightSet {
    keys: Mutex<HashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to claim `key`. Returns `true` if this call won the race
    /// and must perform the revalidation; `false` if one is already
    /// running.
    pub fn try_begin(&self, key: &str) -> bool {
        self.keys.lock().unwrap().insert(key.to_owned())
    }

    pub fn finish(&self, key: &str) {
        self.keys.lock().unwrap().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_empty_cache_is_a_miss() {
        let cache = RenderCache::new(500);
        assert!(cache.get("/p").is_none());
    }

    #[test]
    fn insert_then_get_returns_the_stored_bytes() {
        let cache = RenderCache::new(500);
        cache.insert("/p".to_owned(), b"hello".to_vec());
        assert_eq!(cache.get("/p").unwrap().bytes.as_slice(), b"hello");
    }

    #[test]
    fn fifo_eviction_drops_the_oldest_keys_first() {
        let cache = RenderCache::new(3);
        for i in 0..5 {
            cache.insert(format!("/p{i}"), vec![i as u8]);
        }
        assert!(cache.get("/p0").is_none());
        assert!(cache.get("/p1").is_none());
        assert!(cache.get("/p2").is_some());
        assert!(cache.get("/p3").is_some());
        assert!(cache.get("/p4").is_some());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn negative_one_max_entries_means_unbounded() {
        let cache = RenderCache::new(-1);
        for i in 0..50 {
            cache.insert(format!("/p{i}"), vec![]);
        }
        assert_eq!(cache.len(), 50);
    }

    #[test]
    fn re_inserting_an_existing_key_does_not_duplicate_its_fifo_slot() {
        let cache = RenderCache::new(2);
        cache.insert("/a".to_owned(), vec![1]);
        cache.insert("/b".to_owned(), vec![2]);
        cache.insert("/a".to_owned(), vec![3]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("/a").unwrap().bytes.as_slice(), &[3]);
        assert!(cache.get("/b").is_some());
    }

    #[test]
    fn in_flight_set_allows_only_one_concurrent_claim_per_key() {
        let set = InFlightSet::new();
        assert!(set.try_begin("/p"));
        assert!(!set.try_begin("/p"));
        set.finish("/p");
        assert!(set.try_begin("/p"));
    }
}
