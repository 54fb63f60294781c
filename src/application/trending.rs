//! Trending hashtags with time-based revalidation.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;

use crate::application::repos::{RepoError, TagsRepo};
use crate::cache::{KeySpace, KvError, KvStore, ReadThroughError, read_through};
use crate::domain::entities::HashtagTrend;

#[derive(Debug, Error)]
pub enum TrendingError {
    #[error("trending cache unavailable")]
    Cache(#[source] KvError),
    #[error("trending store unavailable")]
    Store(#[source] RepoError),
    #[error("failed to encode trending hashtags")]
    Encode(#[source] serde_json::Error),
}

impl From<ReadThroughError<RepoError>> for TrendingError {
    fn from(error: ReadThroughError<RepoError>) -> Self {
        match error {
            ReadThroughError::Cache(err) => Self::Cache(err),
            ReadThroughError::Source(err) => Self::Store(err),
            ReadThroughError::Encode { source, .. } => Self::Encode(source),
        }
    }
}

#[derive(Clone)]
pub struct TrendingHashtags {
    kv: Arc<dyn KvStore>,
    repo: Arc<dyn TagsRepo>,
    keys: KeySpace,
    window_hours: u32,
    revalidate: Duration,
}

impl TrendingHashtags {
    pub fn new(
        kv: Arc<dyn KvStore>,
        repo: Arc<dyn TagsRepo>,
        keys: KeySpace,
        window_hours: u32,
        revalidate: Duration,
    ) -> Self {
        Self {
            kv,
            repo,
            keys,
            window_hours,
            revalidate,
        }
    }

    /// Top hashtags by posts in the rolling window. A computed list is served
    /// unchanged until the revalidation interval lapses.
    pub async fn trending(&self, limit: usize) -> Result<Vec<HashtagTrend>, TrendingError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.keys.trending(self.window_hours, limit);
        let since = OffsetDateTime::now_utc() - time::Duration::hours(i64::from(self.window_hours));
        let repo = &self.repo;
        let trends = read_through(self.kv.as_ref(), "trending", &key, self.revalidate, || async {
            repo.trending_hashtags(since, limit).await
        })
        .await?;
        Ok(trends)
    }
}
