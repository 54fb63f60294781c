//! Router wiring and request helpers shared by the integration tests.
#![allow(dead_code)]

use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pulse::application::counters::CounterCache;
use pulse::application::followers::{FollowService, FollowerInfoCache};
use pulse::application::tags::TagCache;
use pulse::application::testing::MemoryStore;
use pulse::application::trending::TrendingHashtags;
use pulse::cache::{CacheConfig, KeySpace, KvStore, MemoryKvStore};
use pulse::config::LimitSettings;
use pulse::infra::http::{ApiLimits, ApiState, build_router};

pub fn memory_kv() -> Arc<dyn KvStore> {
    Arc::new(MemoryKvStore::with_capacity(
        NonZeroUsize::new(1024).expect("non-zero"),
    ))
}

fn limits(default: u32, max: u32) -> LimitSettings {
    LimitSettings {
        default: NonZeroU32::new(default).expect("non-zero"),
        max: NonZeroU32::new(max).expect("non-zero"),
    }
}

pub fn build_state(kv: Arc<dyn KvStore>, store: Arc<MemoryStore>) -> ApiState {
    let config = CacheConfig::default();
    let counters = CounterCache::new(kv.clone(), store.clone(), &config);
    let tags = Arc::new(TagCache::new(store.clone()));
    let trending = TrendingHashtags::new(
        kv.clone(),
        store.clone(),
        KeySpace::new(config.key_prefix.clone()),
        24,
        Duration::from_secs(60),
    );
    let follows = FollowService::new(
        store.clone(),
        FollowerInfoCache::new(kv.clone(), store.clone(), &config),
    );

    ApiState {
        counters,
        tags,
        trending,
        follows,
        store,
        kv,
        limits: ApiLimits {
            tags: limits(10, 50),
            trending: limits(10, 50),
        },
    }
}

pub fn router(kv: Arc<dyn KvStore>, store: Arc<MemoryStore>) -> Router {
    build_router(build_state(kv, store))
}

/// Send one request and decode the body as JSON (`Value::Null` when empty).
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn as_viewer(method: &str, uri: &str, viewer: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", viewer)
        .body(Body::empty())
        .expect("request")
}
