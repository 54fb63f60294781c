//! Tag search and popularity over an in-process snapshot.
//!
//! Readers clone the current `Arc<TagIndex>` under a brief read lock and work
//! on that snapshot. Writers (bulk sync and per-post adjustments) are
//! serialized by an async mutex, update Postgres first, then publish a new
//! snapshot with a single pointer swap.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::repos::{RepoError, TagsRepo};
use crate::cache::{TagIndex, rw_read, rw_write};
use crate::domain::entities::TagUsage;
use crate::domain::error::DomainError;
use crate::domain::hashtags::{extract_hashtags, normalize_tag_names};
use crate::domain::types::PostId;

const SOURCE: &str = "application::tags";

#[derive(Debug, Error)]
pub enum TagCacheError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct TagCache {
    repo: Arc<dyn TagsRepo>,
    index: RwLock<Arc<TagIndex>>,
    writer: Mutex<()>,
}

impl TagCache {
    pub fn new(repo: Arc<dyn TagsRepo>) -> Self {
        Self {
            repo,
            index: RwLock::new(Arc::new(TagIndex::default())),
            writer: Mutex::new(()),
        }
    }

    /// The snapshot readers currently see. Never blocks on writers.
    pub fn current(&self) -> Arc<TagIndex> {
        rw_read(&self.index, SOURCE, "current").clone()
    }

    pub async fn search_tags(&self, query: &str, limit: usize) -> Result<Vec<String>, TagCacheError> {
        if query.trim().trim_start_matches('#').is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self.loaded().await?.search(query, limit))
    }

    pub async fn popular_tags(&self, limit: usize) -> Result<Vec<TagUsage>, TagCacheError> {
        Ok(self.loaded().await?.popular(limit))
    }

    /// Recount every tag in Postgres and replace the snapshot. Returns the
    /// number of indexed tags.
    pub async fn sync_tag_counts(&self) -> Result<usize, TagCacheError> {
        let _writer = self.writer.lock().await;
        self.resync().await
    }

    /// Attach tags to a post and publish the new counts.
    pub async fn record_post_tags(
        &self,
        post: &PostId,
        names: &[String],
    ) -> Result<Vec<TagUsage>, TagCacheError> {
        let names = normalize_tag_names(names)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let _writer = self.writer.lock().await;
        let updates = self.repo.record_post_tags(post, &names).await?;
        self.publish(&updates);
        Ok(updates)
    }

    /// Record every `#hashtag` found in a post body.
    pub async fn record_post_content(
        &self,
        post: &PostId,
        body: &str,
    ) -> Result<Vec<TagUsage>, TagCacheError> {
        self.record_post_tags(post, &extract_hashtags(body)).await
    }

    /// Detach all tags from a deleted post and publish the new counts.
    pub async fn release_post_tags(&self, post: &PostId) -> Result<Vec<TagUsage>, TagCacheError> {
        let _writer = self.writer.lock().await;
        let updates = self.repo.release_post_tags(post).await?;
        self.publish(&updates);
        Ok(updates)
    }

    async fn loaded(&self) -> Result<Arc<TagIndex>, TagCacheError> {
        let current = self.current();
        if current.generation() > 0 {
            return Ok(current);
        }

        let _writer = self.writer.lock().await;
        // Another reader may have loaded it while we waited.
        let current = self.current();
        if current.generation() > 0 {
            return Ok(current);
        }
        self.resync().await?;
        Ok(self.current())
    }

    async fn resync(&self) -> Result<usize, TagCacheError> {
        let started = Instant::now();
        let usages = self.repo.recount_tags().await?;
        let generation = self.current().generation() + 1;
        let next = Arc::new(TagIndex::build(usages, generation));
        let size = next.len();

        *rw_write(&self.index, SOURCE, "resync") = next;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("pulse_tag_sync_ms").record(elapsed_ms);
        metrics::gauge!("pulse_tag_index_size").set(size as f64);
        info!(target = SOURCE, tags = size, generation, elapsed_ms, "Tag index synced");
        Ok(size)
    }

    fn publish(&self, updates: &[TagUsage]) {
        if updates.is_empty() {
            return;
        }
        let mut index = rw_write(&self.index, SOURCE, "publish");
        // An index that was never loaded stays unloaded so the next read pulls a full recount.
        if index.generation() == 0 {
            return;
        }
        let next = Arc::new(index.with_updates(updates));
        debug!(
            target = SOURCE,
            updated = updates.len(),
            generation = next.generation(),
            "Published tag adjustments"
        );
        *index = next;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use time::OffsetDateTime;

    use super::*;
    use crate::application::testing::MemoryTagsRepo;

    fn post(raw: &str) -> PostId {
        PostId::parse(raw).expect("post id")
    }

    fn seeded() -> Arc<MemoryTagsRepo> {
        let repo = Arc::new(MemoryTagsRepo::default());
        let now = OffsetDateTime::now_utc();
        for (post, tag) in [
            ("p1", "rust"),
            ("p2", "rust"),
            ("p3", "rust"),
            ("p1", "react"),
            ("p2", "react"),
            ("p3", "react"),
            ("p1", "career"),
            ("p2", "frontend"),
        ] {
            repo.assign_at(post, tag, now);
        }
        repo
    }

    #[tokio::test]
    async fn first_read_loads_index_once() {
        let repo = seeded();
        let tags = TagCache::new(repo.clone());

        let popular = tags.popular_tags(2).await.expect("popular");
        assert_eq!(popular[0].name, "react");
        assert_eq!(popular[1].name, "rust");
        tags.search_tags("re", 10).await.expect("search");
        assert_eq!(repo.recounts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn popular_is_non_increasing_with_name_ties() {
        let tags = TagCache::new(seeded());
        tags.sync_tag_counts().await.expect("sync");

        let popular = tags.popular_tags(10).await.expect("popular");
        for pair in popular.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.usage_count >= b.usage_count);
            if a.usage_count == b.usage_count {
                assert!(a.name < b.name);
            }
        }
    }

    #[tokio::test]
    async fn search_matches_substrings_case_insensitively() {
        let tags = TagCache::new(seeded());
        let found = tags.search_tags("RE", 10).await.expect("search");
        assert_eq!(found, vec!["react", "career"]);
        assert!(found.iter().all(|name| name.contains("re")));
        assert!(tags.search_tags("", 10).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn sync_is_idempotent_and_swaps_whole_snapshot() {
        let repo = seeded();
        let tags = TagCache::new(repo.clone());
        tags.sync_tag_counts().await.expect("sync");
        let before = tags.current();

        tags.sync_tag_counts().await.expect("sync");
        let after = tags.current();
        assert_eq!(before.popular(10), after.popular(10));
        assert!(after.generation() > before.generation());

        repo.assign_at("p9", "wasm", OffsetDateTime::now_utc());
        tags.sync_tag_counts().await.expect("sync");
        assert!(before.search("wasm", 5).is_empty());
        assert_eq!(tags.current().search("wasm", 5), vec!["wasm"]);
    }

    #[tokio::test]
    async fn record_and_release_adjust_snapshot() {
        let tags = TagCache::new(seeded());
        tags.sync_tag_counts().await.expect("sync");

        tags.record_post_content(&post("p7"), "Trying #Frontend and #frontend #css")
            .await
            .expect("record");
        let popular = tags.popular_tags(10).await.expect("popular");
        let usage = |name: &str| popular.iter().find(|u| u.name == name).map(|u| u.usage_count);
        assert_eq!(usage("frontend"), Some(2));
        assert_eq!(usage("css"), Some(1));

        tags.release_post_tags(&post("p7")).await.expect("release");
        let popular = tags.popular_tags(10).await.expect("popular");
        assert!(popular.iter().all(|u| u.name != "css"));
        assert!(tags.search_tags("css", 10).await.expect("search").is_empty());
        assert_eq!(
            popular.iter().find(|u| u.name == "frontend").map(|u| u.usage_count),
            Some(1)
        );
    }

    #[tokio::test]
    async fn invalid_tag_names_are_rejected() {
        let tags = TagCache::new(seeded());
        let err = tags
            .record_post_tags(&post("p1"), &["not a tag".to_string()])
            .await
            .expect_err("invalid");
        assert!(matches!(err, TagCacheError::Domain(_)));
    }

    #[tokio::test]
    async fn writes_before_first_load_do_not_hide_existing_tags() {
        let tags = TagCache::new(seeded());
        tags.record_post_tags(&post("p5"), &["wasm".to_string()])
            .await
            .expect("record");

        let found = tags.popular_tags(10).await.expect("popular");
        assert!(found.iter().any(|u| u.name == "rust"));
        assert!(found.iter().any(|u| u.name == "wasm"));
    }
}
