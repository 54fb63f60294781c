//! Key-value store adapter contract.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cached value under `{key}` is not an integer counter")]
    NotAnInteger { key: String },
    #[error("counter under `{key}` would overflow")]
    Overflow { key: String },
    #[error("cache backend does not support `{operation}`")]
    Unsupported { operation: &'static str },
}

impl KvError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Remote (or in-process) key-value store backing every cache.
///
/// Values are strings; counters are stored as decimal integers so both
/// backends can apply increments server-side. A TTL always accompanies a
/// write, so no cache entry outlives its configured lifetime.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short name used in logs and metric labels.
    fn backend_name(&self) -> &'static str;

    /// Whether `incr_if_present` / `incr_or_init` are available. Callers fall
    /// back to `compare_and_swap` when this is false.
    fn supports_atomic_incr(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Reset the lifetime of a live key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Add `delta` to a live counter; `None` when the key is absent.
    async fn incr_if_present(&self, key: &str, delta: i64) -> Result<Option<i64>, KvError>;

    /// One atomic step: add `delta` if the key is live, otherwise create it as
    /// `init + delta` with the given lifetime.
    async fn incr_or_init(
        &self,
        key: &str,
        init: i64,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64, KvError>;

    /// Replace the value only if the current value equals `expected`
    /// (`None` meaning absent). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, KvError>;

    async fn ping(&self) -> Result<(), KvError>;
}

pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    ms.max(1)
}
