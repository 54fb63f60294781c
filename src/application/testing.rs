//! In-memory repositories and KV doubles shared by unit and integration tests.
//!
//! Compiled for `cfg(test)` and behind the `test-support` feature.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Notify;

use crate::application::repos::{CountersRepo, FollowsRepo, HealthCheck, RepoError, TagsRepo};
use crate::cache::{KvError, KvStore};
use crate::domain::entities::{FollowerCounts, HashtagTrend, TagUsage};
use crate::domain::types::{CounterKey, PostId, UserId};

fn offline() -> RepoError {
    RepoError::from_persistence("store offline")
}

#[derive(Default)]
pub struct MemoryCountersRepo {
    values: Mutex<HashMap<CounterKey, u64>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    hold_writes: AtomicBool,
    released: Notify,
}

impl MemoryCountersRepo {
    pub fn put(&self, key: &CounterKey, value: u64) {
        self.values.lock().expect("lock").insert(key.clone(), value);
    }

    pub fn value(&self, key: &CounterKey) -> Option<u64> {
        self.values.lock().expect("lock").get(key).copied()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Park every `store_counters` call until [`Self::release_writes`].
    pub fn hold_writes(&self, hold: bool) {
        self.hold_writes.store(hold, Ordering::SeqCst);
    }

    /// Let one parked write proceed.
    pub fn release_writes(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl CountersRepo for MemoryCountersRepo {
    async fn load_counter(&self, key: &CounterKey) -> Result<u64, RepoError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self.value(key).unwrap_or(0))
    }

    async fn store_counters(&self, values: &[(CounterKey, u64)]) -> Result<(), RepoError> {
        if self.hold_writes.load(Ordering::SeqCst) {
            self.released.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(offline());
        }
        let mut stored = self.values.lock().expect("lock");
        for (key, value) in values {
            let slot = stored.entry(key.clone()).or_insert(0);
            *slot = (*slot).max(*value);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTagsRepo {
    tags: Mutex<BTreeSet<String>>,
    assignments: Mutex<Vec<(PostId, String, OffsetDateTime)>>,
    offline: AtomicBool,
    pub recounts: AtomicUsize,
    pub trending_calls: AtomicUsize,
}

impl MemoryTagsRepo {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(())
    }

    pub fn assign(&self, post: &str, tag: &str) {
        self.assign_at(post, tag, OffsetDateTime::now_utc());
    }

    pub fn assign_at(&self, post: &str, tag: &str, at: OffsetDateTime) {
        self.tags.lock().expect("lock").insert(tag.to_string());
        self.assignments.lock().expect("lock").push((
            PostId::parse(post).expect("post id"),
            tag.to_string(),
            at,
        ));
    }

    fn usage_of(&self, names: &BTreeSet<String>) -> Vec<TagUsage> {
        let assignments = self.assignments.lock().expect("lock");
        names
            .iter()
            .map(|name| TagUsage {
                name: name.clone(),
                usage_count: assignments.iter().filter(|(_, tag, _)| tag == name).count() as u64,
            })
            .collect()
    }
}

#[async_trait]
impl TagsRepo for MemoryTagsRepo {
    async fn recount_tags(&self) -> Result<Vec<TagUsage>, RepoError> {
        self.check()?;
        self.recounts.fetch_add(1, Ordering::SeqCst);
        let names = self.tags.lock().expect("lock").clone();
        Ok(self.usage_of(&names))
    }

    async fn record_post_tags(
        &self,
        post_id: &PostId,
        names: &[String],
    ) -> Result<Vec<TagUsage>, RepoError> {
        self.check()?;
        let mut changed = BTreeSet::new();
        {
            let mut tags = self.tags.lock().expect("lock");
            let mut assignments = self.assignments.lock().expect("lock");
            for name in names {
                tags.insert(name.clone());
                let exists = assignments
                    .iter()
                    .any(|(post, tag, _)| post == post_id && tag == name);
                if !exists {
                    assignments.push((post_id.clone(), name.clone(), OffsetDateTime::now_utc()));
                    changed.insert(name.clone());
                }
            }
        }
        Ok(self.usage_of(&changed))
    }

    async fn release_post_tags(&self, post_id: &PostId) -> Result<Vec<TagUsage>, RepoError> {
        self.check()?;
        let changed: BTreeSet<String> = {
            let mut assignments = self.assignments.lock().expect("lock");
            let removed = assignments
                .iter()
                .filter(|(post, _, _)| post == post_id)
                .map(|(_, tag, _)| tag.clone())
                .collect();
            assignments.retain(|(post, _, _)| post != post_id);
            removed
        };
        Ok(self.usage_of(&changed))
    }

    async fn trending_hashtags(
        &self,
        since: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<HashtagTrend>, RepoError> {
        self.check()?;
        self.trending_calls.fetch_add(1, Ordering::SeqCst);
        let assignments = self.assignments.lock().expect("lock");
        let mut posts: BTreeMap<String, BTreeSet<PostId>> = BTreeMap::new();
        for (post, tag, at) in assignments.iter() {
            if *at >= since {
                posts.entry(tag.clone()).or_default().insert(post.clone());
            }
        }
        let mut trends: Vec<HashtagTrend> = posts
            .into_iter()
            .map(|(tag, posts)| HashtagTrend {
                tag,
                post_count: posts.len() as u64,
            })
            .collect();
        trends.sort_by(|a, b| b.post_count.cmp(&a.post_count));
        trends.truncate(limit);
        Ok(trends)
    }
}

#[derive(Default)]
pub struct MemoryFollowsRepo {
    edges: Mutex<BTreeSet<(UserId, UserId)>>,
    offline: AtomicBool,
    pub count_calls: AtomicUsize,
}

impl MemoryFollowsRepo {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(())
    }

    /// Write an edge directly, bypassing any cache invalidation.
    pub fn insert_edge(&self, follower: &str, followee: &str) {
        self.edges.lock().expect("lock").insert((
            UserId::parse(follower).expect("user id"),
            UserId::parse(followee).expect("user id"),
        ));
    }
}

#[async_trait]
impl FollowsRepo for MemoryFollowsRepo {
    async fn follower_counts(&self, user: &UserId) -> Result<FollowerCounts, RepoError> {
        self.check()?;
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let edges = self.edges.lock().expect("lock");
        Ok(FollowerCounts {
            follower_count: edges.iter().filter(|(_, followee)| followee == user).count() as u64,
            following_count: edges.iter().filter(|(follower, _)| follower == user).count() as u64,
        })
    }

    async fn is_following(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        self.check()?;
        Ok(self
            .edges
            .lock()
            .expect("lock")
            .contains(&(follower.clone(), followee.clone())))
    }

    async fn insert_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        self.check()?;
        Ok(self
            .edges
            .lock()
            .expect("lock")
            .insert((follower.clone(), followee.clone())))
    }

    async fn delete_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        self.check()?;
        Ok(self
            .edges
            .lock()
            .expect("lock")
            .remove(&(follower.clone(), followee.clone())))
    }
}

/// Every repository behind one handle, as `PostgresRepositories` is in production.
#[derive(Default)]
pub struct MemoryStore {
    pub counters: MemoryCountersRepo,
    pub tags: MemoryTagsRepo,
    pub follows: MemoryFollowsRepo,
}

impl MemoryStore {
    /// Fail every read and write, as when Postgres is unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.counters.fail_reads(offline);
        self.counters.fail_writes(offline);
        self.tags.set_offline(offline);
        self.follows.set_offline(offline);
    }
}

#[async_trait]
impl CountersRepo for MemoryStore {
    async fn load_counter(&self, key: &CounterKey) -> Result<u64, RepoError> {
        self.counters.load_counter(key).await
    }

    async fn store_counters(&self, values: &[(CounterKey, u64)]) -> Result<(), RepoError> {
        self.counters.store_counters(values).await
    }
}

#[async_trait]
impl TagsRepo for MemoryStore {
    async fn recount_tags(&self) -> Result<Vec<TagUsage>, RepoError> {
        self.tags.recount_tags().await
    }

    async fn record_post_tags(
        &self,
        post_id: &PostId,
        names: &[String],
    ) -> Result<Vec<TagUsage>, RepoError> {
        self.tags.record_post_tags(post_id, names).await
    }

    async fn release_post_tags(&self, post_id: &PostId) -> Result<Vec<TagUsage>, RepoError> {
        self.tags.release_post_tags(post_id).await
    }

    async fn trending_hashtags(
        &self,
        since: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<HashtagTrend>, RepoError> {
        self.tags.trending_hashtags(since, limit).await
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn follower_counts(&self, user: &UserId) -> Result<FollowerCounts, RepoError> {
        self.follows.follower_counts(user).await
    }

    async fn is_following(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        self.follows.is_following(follower, followee).await
    }

    async fn insert_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        self.follows.insert_follow(follower, followee).await
    }

    async fn delete_follow(&self, follower: &UserId, followee: &UserId) -> Result<bool, RepoError> {
        self.follows.delete_follow(follower, followee).await
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        self.follows.check()
    }
}

/// KV store whose every call fails, as when Redis is unreachable.
pub struct UnavailableKv;

fn unreachable_kv() -> KvError {
    KvError::unavailable("connection refused")
}

#[async_trait]
impl KvStore for UnavailableKv {
    fn backend_name(&self) -> &'static str {
        "unavailable"
    }

    fn supports_atomic_incr(&self) -> bool {
        true
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
        Err(unreachable_kv())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), KvError> {
        Err(unreachable_kv())
    }

    async fn delete(&self, _key: &str) -> Result<(), KvError> {
        Err(unreachable_kv())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, KvError> {
        Err(unreachable_kv())
    }

    async fn incr_if_present(&self, _key: &str, _delta: i64) -> Result<Option<i64>, KvError> {
        Err(unreachable_kv())
    }

    async fn incr_or_init(
        &self,
        _key: &str,
        _init: i64,
        _delta: i64,
        _ttl: Duration,
    ) -> Result<i64, KvError> {
        Err(unreachable_kv())
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _new: &str,
        _ttl: Duration,
    ) -> Result<bool, KvError> {
        Err(unreachable_kv())
    }

    async fn ping(&self) -> Result<(), KvError> {
        Err(unreachable_kv())
    }
}
