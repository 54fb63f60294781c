//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};

use super::types::UserId;

/// A tag name with the number of posts currently carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub name: String,
    pub usage_count: u64,
}

/// Viewer-independent follow aggregate; safe to cache globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerCounts {
    pub follower_count: u64,
    pub following_count: u64,
}

/// Follow aggregate as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowerInfo {
    pub user_id: UserId,
    pub follower_count: u64,
    pub following_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_followed_by_viewer: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagTrend {
    pub tag: String,
    pub post_count: u64,
}
