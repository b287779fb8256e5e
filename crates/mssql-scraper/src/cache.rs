//! Cumulative-counter cache.
//!
//! SQL Server reports query statistics as monotonically growing totals per
//! `(query_hash, query_plan_hash)`. The cache remembers the last observed
//! value per counter column and turns each new observation into a delta:
//! the first sighting primes the cache and emits nothing, a larger value
//! emits the difference, a smaller-or-equal value is a counter reset (or
//! no progress) and emits nothing. Bounded by LRU eviction so a churning
//! plan cache cannot grow the scraper without limit.

use std::num::NonZeroUsize;

use lru::LruCache;

/// LRU cache of last-seen counter values, keyed by
/// `query_hash-plan_hash-column`.
///
/// Owned by exactly one scraper instance; calls always come from the task
/// driving that instance, so there is no interior locking.
pub struct CounterCache {
    cache: LruCache<String, i64>,
}

impl CounterCache {
    /// Create a cache bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Record `value` for the counter and return `(cached, diff)`.
    ///
    /// - `value < 0`: rejected, cache untouched, returns `(false, 0)`.
    /// - first observation: stored, returns `(false, value)`.
    /// - `value > cached`: stored, returns `(true, value - cached)`.
    /// - `value <= cached`: cache untouched, returns `(true, 0)`.
    pub fn cache_and_diff(
        &mut self,
        query_hash: &str,
        plan_hash: &str,
        column: &str,
        value: i64,
    ) -> (bool, i64) {
        if value < 0 {
            return (false, 0);
        }

        let key = format!("{query_hash}-{plan_hash}-{column}");
        match self.cache.get(&key).copied() {
            None => {
                self.cache.put(key, value);
                (false, value)
            }
            Some(cached) if value > cached => {
                self.cache.put(key, value);
                (true, value - cached)
            }
            Some(_) => (true, 0),
        }
    }

    /// Sample-deduplication check for one scrape interval.
    ///
    /// Returns `true` on the first sighting of `query_hash-plan_hash`
    /// (the key is recorded, the sample should be emitted) and `false`
    /// when the key was already seen.
    pub fn observe_sample(&mut self, query_hash: &str, plan_hash: &str) -> bool {
        let key = format!("{query_hash}-{plan_hash}");
        if self.cache.contains(&key) {
            // Refresh recency so hot sessions are not evicted.
            self.cache.get(&key);
            false
        } else {
            self.cache.put(key, 1);
            true
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

impl std::fmt::Debug for CounterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterCache")
            .field("len", &self.cache.len())
            .field("capacity", &self.cache.cap())
            .finish()
    }
}

/// `cache_and_diff` against an optional cache.
///
/// A scraper without an initialized cache cannot diff; that is an
/// operator-visible misconfiguration, logged once per call site as in the
/// uninitialized-cache contract.
pub(crate) fn cache_and_diff(
    cache: &mut Option<CounterCache>,
    query_hash: &str,
    plan_hash: &str,
    column: &str,
    value: i64,
) -> (bool, i64) {
    match cache {
        Some(cache) => cache.cache_and_diff(query_hash, plan_hash, column, value),
        None => {
            tracing::error!("counter cache is not initialized, skipping caching and diffing");
            (false, 0)
        }
    }
}
