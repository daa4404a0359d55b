// Lightweight negative cache which temporarily remembers signing key ids that
// were not found in the key set, so tokens carrying made-up key ids cannot
// force a key set download on every request.
use crate::metrics_defs::UNKNOWN_KEY_CACHE_HIT;
use moka::sync::Cache;
use shared::counter;
use std::time::Duration;

const SIZE: u64 = 1000;
const TTL_SECS: u64 = 5;

pub struct NegativeCache {
    cache: Cache<String, ()>,
}

impl NegativeCache {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(SIZE)
            .time_to_live(ttl)
            .build();

        NegativeCache { cache }
    }

    pub fn insert(&self, key: &str) {
        self.cache.insert(key.to_string(), ());
    }

    pub fn contains(&self, key: &str) -> bool {
        let cache_hit = self.cache.contains_key(key);
        if cache_hit {
            counter!(UNKNOWN_KEY_CACHE_HIT).increment(1);
        }
        cache_hit
    }

    /// Forgets `key`, used once a key set refresh brought it in.
    pub fn remove(&self, key: &str) {
        self.cache.invalidate(key);
    }
}

impl Default for NegativeCache {
    fn default() -> Self {
        Self::new()
    }
}
