use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::entities::{HashtagTrend, TagUsage};
use crate::domain::types::{PostId, SharePlatform};

#[derive(Debug, Serialize)]
pub struct ViewsResponse {
    pub post_id: PostId,
    pub views: u64,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub platform: String,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub post_id: PostId,
    pub platform: SharePlatform,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct ShareStatsResponse {
    pub post_id: PostId,
    pub total: u64,
    pub platforms: BTreeMap<SharePlatform, u64>,
}

/// `limit` stays a string so malformed values map to a JSON 400 instead of
/// the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct TagSearchQuery {
    pub q: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagSearchResponse {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PopularTagsResponse {
    pub tags: Vec<TagUsage>,
}

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub hashtags: Vec<HashtagTrend>,
}
