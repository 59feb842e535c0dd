use std::time::Duration;

use moka::sync::Cache;

/// Remembers the outcome of operations submitted with an idempotency key.
///
/// Entries expire after the configured TTL; a key seen again after expiry is treated
/// as a brand new operation. Lookups and inserts never suspend, so recording an
/// outcome right after a commit cannot be interrupted by cancellation.
pub struct IdempotencyCache<V> {
    cache: Cache<String, V>
}

impl<V> IdempotencyCache<V>
where
    V: Clone + Send + Sync + 'static
{
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build()
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key)
    }

    /// Returns the value stored under `key`, inserting `init()` first if there is none.
    /// Concurrent callers for the same key all see the single value that won.
    pub fn reserve(&self, key: String, init: impl FnOnce() -> V) -> V {
        self.cache.entry(key).or_insert_with(init).into_value()
    }

    pub fn remember(&self, key: String, value: V) {
        self.cache.insert(key, value);
    }
}
