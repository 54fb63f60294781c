//! Cron job that writes dirty counters back to Postgres.

use apalis::prelude::*;

use crate::application::counters::CounterCache;

/// Every thirty seconds.
pub const DEFAULT_FLUSH_COUNTERS_CRON: &str = "*/30 * * * * *";

#[derive(Default, Debug, Clone)]
pub struct FlushCountersJob;

impl From<chrono::DateTime<chrono::Utc>> for FlushCountersJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct FlushCountersContext {
    pub counters: CounterCache,
}

pub async fn process_flush_counters_job(
    _job: FlushCountersJob,
    ctx: Data<FlushCountersContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.counters.flush().await {
        Ok(report) if report.flushed > 0 => {
            tracing::info!(
                target = "application::jobs::flush_counters",
                flushed = report.flushed,
                "Flushed counters"
            );
        }
        Ok(_) => {}
        Err(err) => {
            metrics::counter!("pulse_job_failure_total", "job" => "flush_counters").increment(1);
            tracing::warn!(
                target = "application::jobs::flush_counters",
                error = %err,
                pending = ctx.counters.pending(),
                "Counter flush failed; keys stay dirty"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::str::FromStr;
    use std::sync::Arc;

    use apalis_cron::Schedule;

    use super::*;
    use crate::application::testing::MemoryCountersRepo;
    use crate::cache::{CacheConfig, MemoryKvStore};
    use crate::domain::types::{CounterKey, PostId};

    #[test]
    fn default_schedule_parses() {
        assert!(Schedule::from_str(DEFAULT_FLUSH_COUNTERS_CRON).is_ok());
    }

    #[tokio::test]
    async fn failed_flush_does_not_fail_the_job() {
        let repo = Arc::new(MemoryCountersRepo::default());
        let kv = Arc::new(MemoryKvStore::with_capacity(NonZeroUsize::new(8).expect("non-zero")));
        let counters = CounterCache::new(kv, repo.clone(), &CacheConfig::default());
        let post = PostId::parse("p1").expect("post id");
        counters.increment_view(&post).await.expect("incr");

        repo.fail_writes(true);
        let ctx = FlushCountersContext { counters: counters.clone() };
        process_flush_counters_job(FlushCountersJob, Data::new(ctx.clone()))
            .await
            .expect("job");
        assert_eq!(counters.pending(), 1);

        repo.fail_writes(false);
        process_flush_counters_job(FlushCountersJob, Data::new(ctx))
            .await
            .expect("job");
        assert_eq!(counters.pending(), 0);
        assert_eq!(repo.value(&CounterKey::view(post)), Some(1));
    }
}
