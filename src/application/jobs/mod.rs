mod flush_counters;
mod sync_tags;

pub use flush_counters::{
    DEFAULT_FLUSH_COUNTERS_CRON, FlushCountersContext, FlushCountersJob, process_flush_counters_job,
};
pub use sync_tags::{DEFAULT_SYNC_TAGS_CRON, SyncTagsContext, SyncTagsJob, process_sync_tags_job};
