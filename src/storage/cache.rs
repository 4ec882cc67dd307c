//! A tiny time-to-live cache used by backends that front a network listing
//! (spec §4.8: "Listings are cached with a time-to-live; task completion
//! invalidates the cache for paths it touched").
//!
//! Single mutex, no eviction thread — entries are checked for staleness on
//! read and simply overwritten on the next successful listing. This matches
//! spec §5's "a single mutex per shared resource is sufficient" guidance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a clone of the cached value if present and not yet expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.lock().unwrap();
        let entry = guard.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.entries.lock().unwrap();
        guard.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &K) {
        let mut guard = self.entries.lock().unwrap();
        guard.remove(key);
    }

    /// Drop every cached entry whose key satisfies `pred`. Used by task
    /// completion to invalidate everything under a touched directory.
    pub fn remove_matching(&self, pred: impl Fn(&K) -> bool) {
        let mut guard = self.entries.lock().unwrap();
        guard.retain(|k, _| !pred(k));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_not_returned() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn fresh_entries_round_trip() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(30));
        cache.insert("a".to_string(), 42);
        assert_eq!(cache.get(&"a".to_string()), Some(42));
    }
}
