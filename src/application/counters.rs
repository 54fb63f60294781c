//! View and share counters.
//!
//! The KV entry is the live value; Postgres holds the last flushed value.
//! Increments go to the KV store only and mark the key dirty; the flush job
//! writes dirty values back in batches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::try_join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::{CountersRepo, RepoError};
use crate::cache::{CacheConfig, KeySpace, KvError, KvStore};
use crate::domain::types::{CounterKey, PostId, SharePlatform};

const SOURCE: &str = "application::counters";

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter cache unavailable")]
    Cache(#[source] KvError),
    #[error("counter store unavailable")]
    Store(#[source] RepoError),
    #[error("counter `{key}` still contended after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
}

impl From<KvError> for CounterError {
    fn from(error: KvError) -> Self {
        Self::Cache(error)
    }
}

impl From<RepoError> for CounterError {
    fn from(error: RepoError) -> Self {
        Self::Store(error)
    }
}

/// Per-platform share counts of one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareStats {
    pub total: u64,
    pub platforms: BTreeMap<SharePlatform, u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct DirtyCounter {
    key: CounterKey,
    /// Highest value this process has observed; survives eviction of the KV entry.
    value: u64,
}

#[derive(Clone)]
pub struct CounterCache {
    kv: Arc<dyn KvStore>,
    repo: Arc<dyn CountersRepo>,
    keys: KeySpace,
    ttl: Duration,
    cas_attempts: u32,
    dirty: Arc<DashMap<String, DirtyCounter>>,
}

fn to_count(cache_key: &str, value: i64) -> Result<u64, CounterError> {
    u64::try_from(value).map_err(|_| {
        CounterError::Cache(KvError::NotAnInteger {
            key: cache_key.to_string(),
        })
    })
}

fn parse_count(cache_key: &str, raw: &str) -> Result<u64, CounterError> {
    raw.parse::<u64>().map_err(|_| {
        CounterError::Cache(KvError::NotAnInteger {
            key: cache_key.to_string(),
        })
    })
}

fn to_init(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl CounterCache {
    pub fn new(kv: Arc<dyn KvStore>, repo: Arc<dyn CountersRepo>, config: &CacheConfig) -> Self {
        Self {
            kv,
            repo,
            keys: KeySpace::new(config.key_prefix.clone()),
            ttl: config.counter_ttl(),
            cas_attempts: config.cas_attempts(),
            dirty: Arc::new(DashMap::new()),
        }
    }

    /// Add one to a counter and return the new value.
    pub async fn increment(&self, key: &CounterKey) -> Result<u64, CounterError> {
        let cache_key = self.keys.counter(key);
        let value = if self.kv.supports_atomic_incr() {
            self.increment_atomic(key, &cache_key).await?
        } else {
            self.increment_cas(key, &cache_key).await?
        };

        self.mark_dirty(cache_key, key, value);
        metrics::counter!("pulse_counter_increment_total", "metric" => key.metric.kind())
            .increment(1);
        Ok(value)
    }

    /// Current value: the live KV entry, else the persisted value cached for
    /// the counter TTL.
    pub async fn get(&self, key: &CounterKey) -> Result<u64, CounterError> {
        let cache_key = self.keys.counter(key);
        if let Some(raw) = self.kv.get(&cache_key).await? {
            metrics::counter!("pulse_cache_hit_total", "cache" => "counter").increment(1);
            return parse_count(&cache_key, &raw);
        }

        metrics::counter!("pulse_cache_miss_total", "cache" => "counter").increment(1);
        let seed = self.seed(key, &cache_key).await?;

        // Populating must not clobber an entry another request created meanwhile.
        if self.kv.supports_atomic_incr() {
            let value = self.kv.incr_or_init(&cache_key, to_init(seed), 0, self.ttl).await?;
            return to_count(&cache_key, value);
        }
        let seed_raw = seed.to_string();
        if self
            .kv
            .compare_and_swap(&cache_key, None, &seed_raw, self.ttl)
            .await?
        {
            return Ok(seed);
        }
        match self.kv.get(&cache_key).await? {
            Some(raw) => parse_count(&cache_key, &raw),
            None => Ok(seed),
        }
    }

    pub async fn increment_view(&self, post: &PostId) -> Result<u64, CounterError> {
        self.increment(&CounterKey::view(post.clone())).await
    }

    pub async fn view_count(&self, post: &PostId) -> Result<u64, CounterError> {
        self.get(&CounterKey::view(post.clone())).await
    }

    pub async fn increment_share(
        &self,
        post: &PostId,
        platform: SharePlatform,
    ) -> Result<u64, CounterError> {
        self.increment(&CounterKey::share(post.clone(), platform))
            .await
    }

    pub async fn share_stats(&self, post: &PostId) -> Result<ShareStats, CounterError> {
        let keys: Vec<CounterKey> = SharePlatform::ALL
            .into_iter()
            .map(|platform| CounterKey::share(post.clone(), platform))
            .collect();
        let counts = try_join_all(keys.iter().map(|key| self.get(key))).await?;

        let platforms: BTreeMap<SharePlatform, u64> =
            SharePlatform::ALL.into_iter().zip(counts).collect();
        let total = platforms.values().sum();
        Ok(ShareStats { total, platforms })
    }

    /// Number of counters changed since the last successful flush.
    pub fn pending(&self) -> usize {
        self.dirty.len()
    }

    /// Persist every dirty counter and refresh its KV lifetime.
    ///
    /// Keys leave the dirty set only once the store has accepted a value at
    /// least as high as theirs, so a failed or cancelled flush loses nothing.
    pub async fn flush(&self) -> Result<FlushReport, CounterError> {
        let started = Instant::now();
        let snapshot: Vec<(String, DirtyCounter)> = self
            .dirty
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        if snapshot.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut batch: Vec<(String, DirtyCounter)> = Vec::with_capacity(snapshot.len());
        for (cache_key, mut pending) in snapshot {
            match self.kv.get(&cache_key).await {
                Ok(Some(raw)) => {
                    if let Ok(live) = raw.parse::<u64>() {
                        pending.value = pending.value.max(live);
                    }
                    if let Err(err) = self.kv.expire(&cache_key, self.ttl).await {
                        warn!(target = SOURCE, key = %cache_key, error = %err, "Failed to refresh counter lifetime");
                    }
                }
                Ok(None) => {
                    debug!(target = SOURCE, key = %cache_key, "Counter entry gone; flushing last observed value");
                }
                Err(err) => {
                    warn!(target = SOURCE, key = %cache_key, error = %err, "Counter read failed during flush; using last observed value");
                }
            }
            batch.push((cache_key, pending));
        }

        let values: Vec<(CounterKey, u64)> = batch
            .iter()
            .map(|(_, pending)| (pending.key.clone(), pending.value))
            .collect();

        match self.repo.store_counters(&values).await {
            Ok(()) => {
                let flushed = batch.len();
                for (cache_key, written) in &batch {
                    // Increments that landed during the write keep the key dirty.
                    self.dirty
                        .remove_if(cache_key, |_, pending| pending.value <= written.value);
                }
                metrics::counter!("pulse_counter_flush_total", "result" => "ok")
                    .increment(flushed as u64);
                metrics::histogram!("pulse_counter_flush_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                debug!(target = SOURCE, flushed, "Flushed counters");
                Ok(FlushReport { flushed, failed: 0 })
            }
            Err(err) => {
                let failed = batch.len();
                // Keep the live values read above in case the KV entries expire before the retry.
                for (cache_key, pending) in batch {
                    self.mark_dirty(cache_key, &pending.key, pending.value);
                }
                metrics::counter!("pulse_counter_flush_total", "result" => "error")
                    .increment(failed as u64);
                Err(CounterError::Store(err))
            }
        }
    }

    async fn increment_atomic(&self, key: &CounterKey, cache_key: &str) -> Result<u64, CounterError> {
        if let Some(value) = self.kv.incr_if_present(cache_key, 1).await? {
            return to_count(cache_key, value);
        }
        let seed = self.seed(key, cache_key).await?;
        let value = self
            .kv
            .incr_or_init(cache_key, to_init(seed), 1, self.ttl)
            .await?;
        to_count(cache_key, value)
    }

    async fn increment_cas(&self, key: &CounterKey, cache_key: &str) -> Result<u64, CounterError> {
        for attempt in 1..=self.cas_attempts {
            let current = self.kv.get(cache_key).await?;
            let base = match current.as_deref() {
                Some(raw) => parse_count(cache_key, raw)?,
                None => self.seed(key, cache_key).await?,
            };
            let next = base.saturating_add(1);
            if self
                .kv
                .compare_and_swap(cache_key, current.as_deref(), &next.to_string(), self.ttl)
                .await?
            {
                return Ok(next);
            }

            metrics::counter!("pulse_counter_cas_retry_total").increment(1);
            debug!(target = SOURCE, key = cache_key, attempt, "Counter swap lost a race; retrying");
            tokio::task::yield_now().await;
        }

        warn!(target = SOURCE, key = cache_key, attempts = self.cas_attempts, "Counter increment gave up");
        Err(CounterError::Contention {
            key: cache_key.to_string(),
            attempts: self.cas_attempts,
        })
    }

    /// Value to start a missing entry from: the persisted value, or a newer
    /// one this process observed but has not flushed yet.
    async fn seed(&self, key: &CounterKey, cache_key: &str) -> Result<u64, CounterError> {
        let stored = self.repo.load_counter(key).await?;
        let observed = self
            .dirty
            .get(cache_key)
            .map(|pending| pending.value)
            .unwrap_or(0);
        Ok(stored.max(observed))
    }

    fn mark_dirty(&self, cache_key: String, key: &CounterKey, value: u64) {
        self.dirty
            .entry(cache_key)
            .and_modify(|pending| pending.value = pending.value.max(value))
            .or_insert_with(|| DirtyCounter {
                key: key.clone(),
                value,
            });
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::application::testing::MemoryCountersRepo;
    use crate::cache::MemoryKvStore;

    fn post(raw: &str) -> PostId {
        PostId::parse(raw).expect("post id")
    }

    fn cache_with(kv: MemoryKvStore, repo: Arc<MemoryCountersRepo>) -> CounterCache {
        CounterCache::new(Arc::new(kv), repo, &CacheConfig::default())
    }

    fn memory_kv() -> MemoryKvStore {
        MemoryKvStore::with_capacity(NonZeroUsize::new(64).expect("non-zero"))
    }

    #[tokio::test]
    async fn cold_counter_is_seeded_from_store() {
        let repo = Arc::new(MemoryCountersRepo::default());
        repo.put(&CounterKey::view(post("p1")), 5);
        let counters = cache_with(memory_kv(), repo);

        for expected in [6, 7, 8] {
            assert_eq!(counters.increment_view(&post("p1")).await.expect("incr"), expected);
        }
        assert_eq!(counters.view_count(&post("p1")).await.expect("get"), 8);
    }

    #[tokio::test]
    async fn cas_path_matches_atomic_path() {
        let repo = Arc::new(MemoryCountersRepo::default());
        repo.put(&CounterKey::view(post("p1")), 5);
        let counters = cache_with(memory_kv().without_atomic_incr(), repo);

        for expected in [6, 7, 8] {
            assert_eq!(counters.increment_view(&post("p1")).await.expect("incr"), expected);
        }
        assert_eq!(counters.view_count(&post("p1")).await.expect("get"), 8);
    }

    #[tokio::test]
    async fn share_platforms_are_independent() {
        let counters = cache_with(memory_kv(), Arc::new(MemoryCountersRepo::default()));
        let p1 = post("p1");

        counters.increment_share(&p1, SharePlatform::Twitter).await.expect("incr");
        counters.increment_share(&p1, SharePlatform::Reddit).await.expect("incr");

        let stats = counters.share_stats(&p1).await.expect("stats");
        assert_eq!(stats.platforms[&SharePlatform::Twitter], 1);
        assert_eq!(stats.platforms[&SharePlatform::Reddit], 1);
        assert_eq!(stats.platforms[&SharePlatform::Email], 0);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.platforms.len(), SharePlatform::ALL.len());
    }

    #[tokio::test]
    async fn get_does_not_overwrite_live_value_with_stale_store_value() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let counters = cache_with(memory_kv(), repo.clone());
        let p1 = post("p1");

        counters.increment_view(&p1).await.expect("incr");
        counters.increment_view(&p1).await.expect("incr");
        assert_eq!(repo.value(&CounterKey::view(p1.clone())), None);
        assert_eq!(counters.view_count(&p1).await.expect("get"), 2);
    }

    #[tokio::test]
    async fn flush_persists_dirty_counters() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let counters = cache_with(memory_kv(), repo.clone());
        let p1 = post("p1");

        counters.increment_view(&p1).await.expect("incr");
        counters.increment_share(&p1, SharePlatform::Email).await.expect("incr");
        assert_eq!(counters.pending(), 2);

        let report = counters.flush().await.expect("flush");
        assert_eq!(report, FlushReport { flushed: 2, failed: 0 });
        assert_eq!(counters.pending(), 0);
        assert_eq!(repo.value(&CounterKey::view(p1.clone())), Some(1));
        assert_eq!(repo.value(&CounterKey::share(p1, SharePlatform::Email)), Some(1));

        assert_eq!(counters.flush().await.expect("flush"), FlushReport::default());
    }

    #[tokio::test]
    async fn failed_flush_keeps_counters_dirty() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let counters = cache_with(memory_kv(), repo.clone());
        counters.increment_view(&post("p1")).await.expect("incr");

        repo.fail_writes(true);
        assert!(matches!(counters.flush().await, Err(CounterError::Store(_))));
        assert_eq!(counters.pending(), 1);

        repo.fail_writes(false);
        assert_eq!(counters.flush().await.expect("flush").flushed, 1);
        assert_eq!(repo.value(&CounterKey::view(post("p1"))), Some(1));
    }

    /// Start a flush and let it run until the store write parks.
    async fn park_flush(
        counters: &CounterCache,
    ) -> tokio::task::JoinHandle<Result<FlushReport, CounterError>> {
        let flushing = counters.clone();
        let handle = tokio::spawn(async move { flushing.flush().await });
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        handle
    }

    #[tokio::test]
    async fn cancelled_flush_keeps_counters_dirty() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let counters = cache_with(memory_kv(), repo.clone());
        let p1 = post("p1");
        for _ in 0..5 {
            counters.increment_view(&p1).await.expect("incr");
        }

        repo.hold_writes(true);
        let handle = park_flush(&counters).await;
        assert!(!handle.is_finished());
        handle.abort();
        assert!(handle.await.expect_err("aborted").is_cancelled());
        assert_eq!(counters.pending(), 1);

        repo.hold_writes(false);
        assert_eq!(counters.flush().await.expect("flush").flushed, 1);
        assert_eq!(repo.value(&CounterKey::view(p1)), Some(5));
        assert_eq!(counters.pending(), 0);
    }

    #[tokio::test]
    async fn increment_during_flush_stays_dirty() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let counters = cache_with(memory_kv(), repo.clone());
        let p1 = post("p1");
        counters.increment_view(&p1).await.expect("incr");

        repo.hold_writes(true);
        let handle = park_flush(&counters).await;
        assert_eq!(counters.increment_view(&p1).await.expect("incr"), 2);
        repo.release_writes();
        assert_eq!(handle.await.expect("join").expect("flush").flushed, 1);

        assert_eq!(repo.value(&CounterKey::view(p1.clone())), Some(1));
        assert_eq!(counters.pending(), 1);

        repo.hold_writes(false);
        counters.flush().await.expect("flush");
        assert_eq!(repo.value(&CounterKey::view(p1)), Some(2));
        assert_eq!(counters.pending(), 0);
    }

    #[tokio::test]
    async fn evicted_dirty_counter_resumes_from_observed_value() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let kv = MemoryKvStore::with_capacity(NonZeroUsize::new(1).expect("non-zero"));
        let counters = cache_with(kv, repo.clone());
        let (p1, p2) = (post("p1"), post("p2"));

        counters.increment_view(&p1).await.expect("incr");
        counters.increment_view(&p1).await.expect("incr");
        // Evicts p1's entry before it was flushed.
        counters.increment_view(&p2).await.expect("incr");

        assert_eq!(counters.increment_view(&p1).await.expect("incr"), 3);
        counters.flush().await.expect("flush");
        assert_eq!(repo.value(&CounterKey::view(p1)), Some(3));
    }

    #[tokio::test]
    async fn cache_failure_is_not_reported_as_zero() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let kv = memory_kv();
        kv.set("pulse:counter:p1:view", "garbage", Duration::from_secs(60))
            .await
            .expect("seed");
        let counters = cache_with(kv, repo);

        assert!(matches!(
            counters.view_count(&post("p1")).await,
            Err(CounterError::Cache(_))
        ));
    }

    #[tokio::test]
    async fn store_failure_surfaces_on_cold_read() {
        let repo = Arc::new(MemoryCountersRepo::default());
        repo.fail_reads(true);
        let counters = cache_with(memory_kv(), repo);

        assert!(matches!(
            counters.increment_view(&post("p1")).await,
            Err(CounterError::Store(_))
        ));
    }
}
