//! Follower aggregates and the follow mutation path that keeps them fresh.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::{FollowsRepo, RepoError};
use crate::cache::{CacheConfig, KeySpace, KvError, KvStore, ReadThroughError, read_through};
use crate::domain::entities::{FollowerCounts, FollowerInfo};
use crate::domain::types::UserId;

const SOURCE: &str = "application::followers";

#[derive(Debug, Error)]
pub enum FollowerError {
    #[error("users cannot follow themselves")]
    SelfFollow,
    #[error("follower cache unavailable")]
    Cache(#[source] KvError),
    #[error("follower store unavailable")]
    Store(#[source] RepoError),
    #[error("failed to encode follower aggregate")]
    Encode(#[source] serde_json::Error),
}

impl From<ReadThroughError<RepoError>> for FollowerError {
    fn from(error: ReadThroughError<RepoError>) -> Self {
        match error {
            ReadThroughError::Cache(err) => Self::Cache(err),
            ReadThroughError::Source(err) => Self::Store(err),
            ReadThroughError::Encode { source, .. } => Self::Encode(source),
        }
    }
}

/// Read-through cache of viewer-independent follow counts.
#[derive(Clone)]
pub struct FollowerInfoCache {
    kv: Arc<dyn KvStore>,
    repo: Arc<dyn FollowsRepo>,
    keys: KeySpace,
    ttl: Duration,
}

impl FollowerInfoCache {
    pub fn new(kv: Arc<dyn KvStore>, repo: Arc<dyn FollowsRepo>, config: &CacheConfig) -> Self {
        Self {
            kv,
            repo,
            keys: KeySpace::new(config.key_prefix.clone()),
            ttl: config.follower_ttl(),
        }
    }

    pub async fn get(&self, user: &UserId) -> Result<FollowerCounts, FollowerError> {
        let key = self.keys.follower_info(user);
        let repo = &self.repo;
        let counts = read_through(self.kv.as_ref(), "follower_info", &key, self.ttl, || async {
            repo.follower_counts(user).await
        })
        .await?;
        Ok(counts)
    }

    /// Drop the cached aggregate so the next read recomputes it.
    pub async fn invalidate(&self, user: &UserId) -> Result<(), FollowerError> {
        let key = self.keys.follower_info(user);
        self.kv.delete(&key).await.map_err(FollowerError::Cache)?;
        debug!(target = SOURCE, user = %user, "Invalidated follower info");
        Ok(())
    }
}

/// Follow/unfollow plus viewer-relative reads.
#[derive(Clone)]
pub struct FollowService {
    repo: Arc<dyn FollowsRepo>,
    cache: FollowerInfoCache,
}

impl FollowService {
    pub fn new(repo: Arc<dyn FollowsRepo>, cache: FollowerInfoCache) -> Self {
        Self { repo, cache }
    }

    pub fn cache(&self) -> &FollowerInfoCache {
        &self.cache
    }

    /// Cached counts, plus whether `viewer` follows `user` when a viewer is known.
    pub async fn get_for_viewer(
        &self,
        user: &UserId,
        viewer: Option<&UserId>,
    ) -> Result<FollowerInfo, FollowerError> {
        let counts = self.cache.get(user).await?;
        let is_followed_by_viewer = match viewer {
            Some(viewer) if viewer != user => Some(
                self.repo
                    .is_following(viewer, user)
                    .await
                    .map_err(FollowerError::Store)?,
            ),
            Some(_) => Some(false),
            None => None,
        };

        Ok(FollowerInfo {
            user_id: user.clone(),
            follower_count: counts.follower_count,
            following_count: counts.following_count,
            is_followed_by_viewer,
        })
    }

    /// Returns whether a new edge was created.
    pub async fn follow(&self, viewer: &UserId, subject: &UserId) -> Result<bool, FollowerError> {
        if viewer == subject {
            return Err(FollowerError::SelfFollow);
        }
        let created = self
            .repo
            .insert_follow(viewer, subject)
            .await
            .map_err(FollowerError::Store)?;
        if created {
            self.invalidate_pair(viewer, subject).await?;
        }
        Ok(created)
    }

    /// Returns whether an edge was removed.
    pub async fn unfollow(&self, viewer: &UserId, subject: &UserId) -> Result<bool, FollowerError> {
        if viewer == subject {
            return Err(FollowerError::SelfFollow);
        }
        let removed = self
            .repo
            .delete_follow(viewer, subject)
            .await
            .map_err(FollowerError::Store)?;
        if removed {
            self.invalidate_pair(viewer, subject).await?;
        }
        Ok(removed)
    }

    async fn invalidate_pair(&self, viewer: &UserId, subject: &UserId) -> Result<(), FollowerError> {
        let (subject_result, viewer_result) =
            tokio::join!(self.cache.invalidate(subject), self.cache.invalidate(viewer));
        if let Err(err) = &subject_result {
            warn!(target = SOURCE, user = %subject, error = %err, "Follower invalidation failed");
        }
        if let Err(err) = &viewer_result {
            warn!(target = SOURCE, user = %viewer, error = %err, "Follower invalidation failed");
        }
        subject_result.and(viewer_result)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::application::testing::MemoryFollowsRepo;
    use crate::cache::MemoryKvStore;

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).expect("user id")
    }

    fn service(repo: Arc<MemoryFollowsRepo>) -> FollowService {
        let kv = Arc::new(MemoryKvStore::with_capacity(
            NonZeroUsize::new(64).expect("non-zero"),
        ));
        let cache = FollowerInfoCache::new(kv, repo.clone(), &CacheConfig::default());
        FollowService::new(repo, cache)
    }

    #[tokio::test]
    async fn counts_are_cached_until_invalidated() {
        let repo = Arc::new(MemoryFollowsRepo::default());
        repo.insert_edge("bob", "alice");
        let follows = service(repo.clone());
        let alice = user("alice");

        assert_eq!(follows.cache().get(&alice).await.expect("get").follower_count, 1);
        repo.insert_edge("carol", "alice");
        assert_eq!(follows.cache().get(&alice).await.expect("get").follower_count, 1);
        assert_eq!(repo.count_calls.load(Ordering::SeqCst), 1);

        follows.cache().invalidate(&alice).await.expect("invalidate");
        assert_eq!(follows.cache().get(&alice).await.expect("get").follower_count, 2);
    }

    #[tokio::test]
    async fn follow_refreshes_both_sides() {
        let repo = Arc::new(MemoryFollowsRepo::default());
        let follows = service(repo);
        let (alice, bob) = (user("alice"), user("bob"));

        // Warm both entries.
        follows.cache().get(&alice).await.expect("get");
        follows.cache().get(&bob).await.expect("get");

        assert!(follows.follow(&bob, &alice).await.expect("follow"));
        assert!(!follows.follow(&bob, &alice).await.expect("follow again"));

        let alice_info = follows.get_for_viewer(&alice, Some(&bob)).await.expect("info");
        assert_eq!(alice_info.follower_count, 1);
        assert_eq!(alice_info.is_followed_by_viewer, Some(true));
        assert_eq!(follows.cache().get(&bob).await.expect("get").following_count, 1);

        assert!(follows.unfollow(&bob, &alice).await.expect("unfollow"));
        let alice_info = follows.get_for_viewer(&alice, None).await.expect("info");
        assert_eq!(alice_info.follower_count, 0);
        assert_eq!(alice_info.is_followed_by_viewer, None);
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let follows = service(Arc::new(MemoryFollowsRepo::default()));
        let alice = user("alice");
        assert!(matches!(
            follows.follow(&alice, &alice).await,
            Err(FollowerError::SelfFollow)
        ));
    }
}
