use std::sync::Arc;

use crate::application::counters::CounterCache;
use crate::application::followers::FollowService;
use crate::application::repos::HealthCheck;
use crate::application::tags::TagCache;
use crate::application::trending::TrendingHashtags;
use crate::cache::KvStore;
use crate::config::LimitSettings;

/// Result-size bounds applied to list endpoints.
#[derive(Debug, Clone, Copy)]
pub struct ApiLimits {
    pub tags: LimitSettings,
    pub trending: LimitSettings,
}

#[derive(Clone)]
pub struct ApiState {
    pub counters: CounterCache,
    pub tags: Arc<TagCache>,
    pub trending: TrendingHashtags,
    pub follows: FollowService,
    pub store: Arc<dyn HealthCheck>,
    pub kv: Arc<dyn KvStore>,
    pub limits: ApiLimits,
}
