//! Bounded in-memory cache with per-entry expiry.
//!
//! [`TtlCache`] is constructed explicitly and injected into the archive
//! metadata client and the live prober, so there is no process-wide state.
//! Entries are read until they are older than the TTL. Eviction happens
//! lazily on insert once the map grows past its size threshold: expired
//! entries go first, then the oldest survivors. There is no background sweeper.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bookloft_core::cache::TtlCache;
//!
//! let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60), 128);
//! cache.insert("answer".to_string(), 42);
//! assert_eq!(cache.get(&"answer".to_string()), Some(42));
//! ```

use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// Default entry lifetime (15 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default number of entries above which inserts trigger eviction.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 2_000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    timestamp: Instant,
}

/// Thread-safe key/value cache with time-to-live expiry.
///
/// Backed by `DashMap`, so it can be shared across Tokio tasks behind an
/// `Arc` without an outer lock.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache with the given TTL and eviction threshold.
    ///
    /// A `max_entries` of zero is treated as one.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a clone of the cached value if present and not expired.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.timestamp.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Stores a value, evicting stale entries when the map is over its threshold.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                timestamp: Instant::now(),
            },
        );
        if self.entries.len() > self.max_entries {
            self.evict();
        }
    }

    /// Removes a single entry.
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    fn evict(&self) {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.timestamp.elapsed() <= ttl);

        let overflow = self.entries.len().saturating_sub(self.max_entries);
        if overflow > 0 {
            let mut by_age: Vec<(K, Instant)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().timestamp))
                .collect();
            by_age.sort_by_key(|(_, timestamp)| *timestamp);
            for (key, _) in by_age.into_iter().take(overflow) {
                self.entries.remove(&key);
            }
        }

        debug!(
            before,
            after = self.entries.len(),
            max_entries = self.max_entries,
            "cache eviction pass"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_value_until_ttl_passes() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(10), 16);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&"a"), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_over_threshold_drops_expired_first() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(5), 2);
        cache.insert(1, 1);
        cache.insert(2, 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        cache.insert(3, 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&3), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_over_threshold_drops_oldest_live_entries() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert(1, 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.insert(2, 2);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.insert(3, 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let cache: TtlCache<u32, u32> = TtlCache::new(DEFAULT_CACHE_TTL, 0);
        cache.insert(1, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_deletes_entry() {
        let cache: TtlCache<u32, u32> = TtlCache::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_MAX_ENTRIES);
        cache.insert(7, 7);
        cache.remove(&7);
        assert!(cache.is_empty());
    }
}
