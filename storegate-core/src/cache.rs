//! Bounded key-value cache with insertion-order eviction and age-based sweep.
//!
//! Eviction is FIFO on first insertion, not LRU: reads never reorder entries
//! and overwriting a key keeps its original slot.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default number of entries a cache holds before evicting.
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    key: String,
    value: V,
    inserted_at: Instant,
}

/// A small FIFO cache owned by a single pipeline stage.
///
/// Entries live in a `VecDeque` in insertion order and are searched
/// linearly; capacities are tens of entries, where a scan beats hashing.
#[derive(Debug, Clone)]
pub struct ExpiringCache<V> {
    entries: VecDeque<CacheEntry<V>>,
    capacity: usize,
}

impl<V> ExpiringCache<V> {
    /// Create an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert or overwrite `key`.
    ///
    /// A new key evicts the oldest-inserted entry when the cache is full. An
    /// existing key is overwritten in place and its age restarts.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = Instant::now();

        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.value = value;
            entry.inserted_at = now;
            return;
        }

        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CacheEntry {
            key,
            value,
            inserted_at: now,
        });
    }

    /// Look up `key`. Does not affect eviction order.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Look up `key` for in-place modification. Does not affect eviction order.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|e| e.key == key)
            .map(|e| &mut e.value)
    }

    /// Remove `key`, returning its value if it was present.
    pub fn delete(&mut self, key: &str) -> Option<V> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        self.entries.remove(index).map(|e| e.value)
    }

    /// Remove every entry older than `max_age`. Returns how many were removed.
    pub fn sweep(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|e| now.saturating_duration_since(e.inserted_at) <= max_age);
        before - self.entries.len()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let mut cache = ExpiringCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);

        // Reading "a" must not protect it: this is FIFO, not LRU.
        assert_eq!(cache.get("a"), Some(&1));
        cache.set("d", 4);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(&2));
        assert_eq!(cache.get("d"), Some(&4));
    }

    #[test]
    fn test_capacity_plus_one_evicts_first_inserted() {
        let mut cache = ExpiringCache::default();
        for i in 0..=DEFAULT_CACHE_CAPACITY {
            cache.set(format!("key-{i}"), i);
        }
        assert_eq!(cache.len(), DEFAULT_CACHE_CAPACITY);
        assert!(cache.get("key-0").is_none());
        assert!(cache.get("key-1").is_some());
    }

    #[test]
    fn test_overwrite_keeps_slot() {
        let mut cache = ExpiringCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        cache.set("c", 3);

        // "a" was inserted first; overwriting did not move it to the back.
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(&2));
        assert_eq!(cache.get("c"), Some(&3));
    }

    #[test]
    fn test_delete() {
        let mut cache = ExpiringCache::new(4);
        cache.set("a", 1);
        assert_eq!(cache.delete("a"), Some(1));
        assert_eq!(cache.delete("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = ExpiringCache::new(0);
        cache.set("a", 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_stale_entries() {
        let mut cache = ExpiringCache::new(8);
        cache.set("old", 1);
        tokio::time::advance(Duration::from_secs(10)).await;
        cache.set("fresh", 2);
        tokio::time::advance(Duration::from_secs(2)).await;

        let removed = cache.sweep(Duration::from_secs(5));
        assert_eq!(removed, 1);
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.get("fresh"), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_restarts_age() {
        let mut cache = ExpiringCache::new(8);
        cache.set("a", 1);
        tokio::time::advance(Duration::from_secs(10)).await;
        cache.set("a", 2);

        assert_eq!(cache.sweep(Duration::from_secs(5)), 0);
        assert_eq!(cache.get("a"), Some(&2));
    }
}
