//! Cache configuration.
//!
//! Controls the KV backend, key namespace and entry lifetimes via `pulse.toml`.
//! TTLs are operational assumptions, not guarantees from the backing store.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_KEY_PREFIX: &str = "pulse";
const DEFAULT_COUNTER_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_FOLLOWER_TTL_SECS: u64 = 60;
const DEFAULT_CAS_RETRY_LIMIT: u32 = 16;
const DEFAULT_MEMORY_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Cache configuration from `pulse.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which KV store backs the caches.
    pub backend: CacheBackend,
    /// Redis connection URL; required when `backend = "redis"`.
    pub redis_url: Option<String>,
    /// Namespace prepended to every key.
    pub key_prefix: String,
    /// Lifetime of a counter entry; refreshed on every flush.
    pub counter_ttl_seconds: u64,
    /// Lifetime of a cached follower aggregate.
    pub follower_ttl_seconds: u64,
    /// Attempts allowed for the compare-and-swap increment fallback.
    pub cas_retry_limit: u32,
    /// Maximum entries held by the in-process backend.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            counter_ttl_seconds: DEFAULT_COUNTER_TTL_SECS,
            follower_ttl_seconds: DEFAULT_FOLLOWER_TTL_SECS,
            cas_retry_limit: DEFAULT_CAS_RETRY_LIMIT,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            key_prefix: settings.key_prefix.clone(),
            counter_ttl_seconds: settings.counter_ttl.as_secs(),
            follower_ttl_seconds: settings.follower_ttl.as_secs(),
            cas_retry_limit: settings.cas_retry_limit.get(),
            memory_capacity: settings.memory_capacity.get(),
        }
    }
}

impl CacheConfig {
    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.counter_ttl_seconds.max(1))
    }

    pub fn follower_ttl(&self) -> Duration {
        Duration::from_secs(self.follower_ttl_seconds.max(1))
    }

    /// At least one attempt is always made.
    pub fn cas_attempts(&self) -> u32 {
        self.cas_retry_limit.max(1)
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, CacheBackend::Memory);
        assert_eq!(config.key_prefix, "pulse");
        assert_eq!(config.counter_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.follower_ttl(), Duration::from_secs(60));
        assert_eq!(config.cas_attempts(), 16);
        assert_eq!(config.memory_capacity, 100_000);
    }

    #[test]
    fn zero_values_clamp_to_minimums() {
        let config = CacheConfig {
            follower_ttl_seconds: 0,
            cas_retry_limit: 0,
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.follower_ttl(), Duration::from_secs(1));
        assert_eq!(config.cas_attempts(), 1);
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }
}
