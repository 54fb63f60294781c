//! Two-tier read: KV entry if live, otherwise the store, then populate.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use super::kv::{KvError, KvStore};

const SOURCE: &str = "cache::read_through";

#[derive(Debug, Error)]
pub enum ReadThroughError<E> {
    #[error(transparent)]
    Cache(#[from] KvError),
    #[error(transparent)]
    Source(E),
    #[error("failed to encode value for `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Serve `key` from the KV store, or call `load` and cache its result for `ttl`.
///
/// `cache` labels the hit/miss metrics. Entries that no longer decode are
/// treated as a miss and overwritten. A KV failure is returned to the caller
/// rather than silently served from the store.
pub async fn read_through<T, E, F, Fut>(
    kv: &dyn KvStore,
    cache: &'static str,
    key: &str,
    ttl: Duration,
    load: F,
) -> Result<T, ReadThroughError<E>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(raw) = kv.get(key).await? {
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                metrics::counter!("pulse_cache_hit_total", "cache" => cache).increment(1);
                return Ok(value);
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    cache,
                    key,
                    error = %err,
                    "Discarding undecodable cache entry"
                );
            }
        }
    }

    metrics::counter!("pulse_cache_miss_total", "cache" => cache).increment(1);
    let value = load().await.map_err(ReadThroughError::Source)?;
    let encoded = serde_json::to_string(&value).map_err(|source| ReadThroughError::Encode {
        key: key.to_string(),
        source,
    })?;
    kv.set(key, &encoded, ttl).await?;
    debug!(target = SOURCE, cache, key, ttl_ms = ttl.as_millis() as u64, "Populated cache entry");

    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::MemoryKvStore;

    const TTL: Duration = Duration::from_secs(30);

    fn kv() -> MemoryKvStore {
        MemoryKvStore::with_capacity(NonZeroUsize::new(16).expect("non-zero"))
    }

    #[tokio::test]
    async fn loads_once_then_serves_cached_value() {
        let kv = kv();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Vec<u32> = read_through(&kv, "test", "k", TTL, || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(vec![1, 2, 3])
            })
            .await
            .expect("read");
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reloads_after_ttl() {
        let kv = kv();
        let loads = AtomicUsize::new(0);
        let read = || {
            read_through(&kv, "test", "k", TTL, || async {
                Ok::<_, std::io::Error>(loads.fetch_add(1, Ordering::SeqCst))
            })
        };

        assert_eq!(read().await.expect("read"), 0);
        assert_eq!(read().await.expect("read"), 0);
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert_eq!(read().await.expect("read"), 1);
    }

    #[tokio::test]
    async fn undecodable_entry_is_replaced() {
        let kv = kv();
        kv.set("k", "{not json", TTL).await.expect("seed");

        let value: u64 = read_through(&kv, "test", "k", TTL, || async {
            Ok::<_, std::io::Error>(7)
        })
        .await
        .expect("read");

        assert_eq!(value, 7);
        assert_eq!(kv.get("k").await.expect("get").as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn source_errors_are_not_cached() {
        let kv = kv();
        let result: Result<u64, _> = read_through(&kv, "test", "k", TTL, || async {
            Err(std::io::Error::other("store down"))
        })
        .await;

        assert!(matches!(result, Err(ReadThroughError::Source(_))));
        assert_eq!(kv.get("k").await.expect("get"), None);
    }
}
