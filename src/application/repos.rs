//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{FollowerCounts, HashtagTrend, TagUsage};
use crate::domain::types::{CounterKey, PostId, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Durable counter values. The cache is seeded from here and flushed back.
#[async_trait]
pub trait CountersRepo: Send + Sync {
    /// Persisted value, 0 when the counter was never written.
    async fn load_counter(&self, key: &CounterKey) -> Result<u64, RepoError>;

    /// Upsert absolute values. A stored value is never lowered, so replaying
    /// an older flush cannot undo a newer one.
    async fn store_counters(&self, values: &[(CounterKey, u64)]) -> Result<(), RepoError>;
}

#[async_trait]
pub trait TagsRepo: Send + Sync {
    /// Recompute every tag's usage from post assignments and persist it.
    async fn recount_tags(&self) -> Result<Vec<TagUsage>, RepoError>;

    /// Attach tags to a post, creating unknown tags. Returns the new usage of
    /// each tag whose count changed.
    async fn record_post_tags(
        &self,
        post_id: &PostId,
        names: &[String],
    ) -> Result<Vec<TagUsage>, RepoError>;

    /// Detach every tag from a post. Returns the new usage of affected tags.
    async fn release_post_tags(&self, post_id: &PostId) -> Result<Vec<TagUsage>, RepoError>;

    /// Tags ranked by distinct posts tagged since `since`.
    async fn trending_hashtags(
        &self,
        since: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<HashtagTrend>, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    async fn follower_counts(&self, user: &UserId) -> Result<FollowerCounts, RepoError>;

    async fn is_following(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError>;

    /// Returns false when the edge already existed.
    async fn insert_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError>;

    /// Returns false when there was no edge to remove.
    async fn delete_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
