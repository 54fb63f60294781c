//! In-process KV backend for single-node runs and tests.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::kv::{KvError, KvStore};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::memory";

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// LRU-bounded map with per-entry expiry.
///
/// All operations take one short mutex, which makes every compound
/// operation (`incr_or_init`, `compare_and_swap`) atomic. Expired entries are
/// dropped lazily on access; the LRU bound evicts the coldest live entries.
pub struct MemoryKvStore {
    entries: Mutex<LruCache<String, Entry>>,
    atomic_incr: bool,
}

impl MemoryKvStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity(config.memory_capacity_non_zero())
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            atomic_incr: true,
        }
    }

    /// Disable the atomic increment operations, forcing callers onto the
    /// compare-and-swap path.
    pub fn without_atomic_incr(mut self) -> Self {
        self.atomic_incr = false;
        self
    }

    /// Number of entries held, including ones not yet reaped.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(entries: &mut LruCache<String, Entry>, key: &str, value: String, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let evicted = entries.push(key.to_string(), entry);
        if evicted.is_some_and(|(old_key, _)| old_key != key) {
            metrics::counter!("pulse_kv_evict_total", "backend" => "memory").increment(1);
        }
    }

    fn unsupported(&self, operation: &'static str) -> Result<(), KvError> {
        if self.atomic_incr {
            Ok(())
        } else {
            Err(KvError::Unsupported { operation })
        }
    }
}

fn live<'c>(entries: &'c mut LruCache<String, Entry>, key: &str) -> Option<&'c mut Entry> {
    let expired = entries
        .peek(key)
        .is_some_and(|entry| entry.expires_at <= Instant::now());
    if expired {
        entries.pop(key);
        return None;
    }
    entries.get_mut(key)
}

fn parse_counter(key: &str, raw: &str) -> Result<i64, KvError> {
    raw.parse::<i64>().map_err(|_| KvError::NotAnInteger {
        key: key.to_string(),
    })
}

fn add(key: &str, current: i64, delta: i64) -> Result<i64, KvError> {
    current.checked_add(delta).ok_or_else(|| KvError::Overflow {
        key: key.to_string(),
    })
}

#[async_trait]
impl KvStore for MemoryKvStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn supports_atomic_incr(&self) -> bool {
        self.atomic_incr
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        Ok(live(&mut entries, key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "set");
        Self::insert(&mut entries, key, value.to_string(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        mutex_lock(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "expire");
        match live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr_if_present(&self, key: &str, delta: i64) -> Result<Option<i64>, KvError> {
        self.unsupported("incr_if_present")?;
        let mut entries = mutex_lock(&self.entries, SOURCE, "incr_if_present");
        let Some(entry) = live(&mut entries, key) else {
            return Ok(None);
        };
        let next = add(key, parse_counter(key, &entry.value)?, delta)?;
        entry.value = next.to_string();
        Ok(Some(next))
    }

    async fn incr_or_init(
        &self,
        key: &str,
        init: i64,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64, KvError> {
        self.unsupported("incr_or_init")?;
        let mut entries = mutex_lock(&self.entries, SOURCE, "incr_or_init");
        if let Some(entry) = live(&mut entries, key) {
            let next = add(key, parse_counter(key, &entry.value)?, delta)?;
            entry.value = next.to_string();
            return Ok(next);
        }
        let next = add(key, init, delta)?;
        Self::insert(&mut entries, key, next.to_string(), ttl);
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "compare_and_swap");
        let current = live(&mut entries, key).map(|entry| entry.value.as_str());
        if current != expected {
            return Ok(false);
        }
        Self::insert(&mut entries, key, new.to_string(), ttl);
        Ok(true)
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}
