//! Cron job that recounts tag usage and replaces the tag index.

use std::sync::Arc;

use apalis::prelude::*;

use crate::application::tags::TagCache;

/// Every five minutes, on the minute.
pub const DEFAULT_SYNC_TAGS_CRON: &str = "0 */5 * * * *";

/// Marker for the cron-triggered tag sync.
#[derive(Default, Debug, Clone)]
pub struct SyncTagsJob;

impl From<chrono::DateTime<chrono::Utc>> for SyncTagsJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct SyncTagsContext {
    pub tags: Arc<TagCache>,
}

/// Failures are logged and left for the next tick; the previous index keeps serving.
pub async fn process_sync_tags_job(
    _job: SyncTagsJob,
    ctx: Data<SyncTagsContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.tags.sync_tag_counts().await {
        Ok(count) => {
            tracing::debug!(target = "application::jobs::sync_tags", tags = count, "Tag sync finished");
        }
        Err(err) => {
            metrics::counter!("pulse_job_failure_total", "job" => "sync_tags").increment(1);
            tracing::warn!(target = "application::jobs::sync_tags", error = %err, "Tag sync failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use apalis_cron::Schedule;

    use super::*;
    use crate::application::testing::MemoryTagsRepo;

    #[test]
    fn default_schedule_parses() {
        let schedule = Schedule::from_str(DEFAULT_SYNC_TAGS_CRON).expect("valid cron");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }

    #[tokio::test]
    async fn job_syncs_the_index() {
        let repo = Arc::new(MemoryTagsRepo::default());
        repo.assign_at("p1", "rust", time::OffsetDateTime::now_utc());
        let tags = Arc::new(TagCache::new(repo));

        process_sync_tags_job(SyncTagsJob, Data::new(SyncTagsContext { tags: tags.clone() }))
            .await
            .expect("job");

        assert_eq!(tags.current().search("rust", 1), vec!["rust"]);
    }
}
