use std::time::Duration;

/// Tunables for [`crate::engine::LedgerEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest an operation waits for its account locks before failing with `LockTimeout`.
    pub lock_timeout: Duration,
    /// How many times a version conflict restarts an operation before it is reported.
    pub max_retries: u32,
    pub idempotency_capacity: u64,
    pub idempotency_ttl: Duration,
    pub balance_cache_capacity: u64,
    pub balance_cache_ttl: Duration
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            max_retries: 3,
            idempotency_capacity: 10_000,
            idempotency_ttl: Duration::from_secs(10 * 60),
            balance_cache_capacity: 10_000,
            balance_cache_ttl: Duration::from_secs(5 * 60)
        }
    }
}

impl EngineConfig {
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_balance_cache(mut self, capacity: u64, ttl: Duration) -> Self {
        self.balance_cache_capacity = capacity;
        self.balance_cache_ttl = ttl;
        self
    }
}
