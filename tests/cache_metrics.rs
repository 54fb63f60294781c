mod support;

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use axum::http::StatusCode;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serial_test::serial;

use pulse::application::testing::MemoryStore;
use pulse::cache::{KvStore, MemoryKvStore};
use pulse::domain::types::PostId;

use support::{build_state, get, post, send};

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

fn counter_value(name: &str, label: (&str, &str)) -> u64 {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(composite, _, _, _)| {
            let key = composite.key();
            key.name() == name
                && key
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}

#[tokio::test]
#[serial]
async fn read_through_paths_emit_hit_and_miss_metrics() {
    snapshotter();
    let before_miss = counter_value("pulse_cache_miss_total", ("cache", "follower_info"));
    let before_hit = counter_value("pulse_cache_hit_total", ("cache", "follower_info"));

    let store = Arc::new(MemoryStore::default());
    store.follows.insert_edge("bob", "alice");
    let app = pulse::infra::http::build_router(build_state(support::memory_kv(), store));

    for _ in 0..3 {
        let (status, _) = send(&app, get("/api/users/alice/followers")).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(
        counter_value("pulse_cache_miss_total", ("cache", "follower_info")) - before_miss,
        1
    );
    assert_eq!(
        counter_value("pulse_cache_hit_total", ("cache", "follower_info")) - before_hit,
        2
    );
}

#[tokio::test]
#[serial]
async fn counter_paths_emit_expected_metric_keys() {
    snapshotter();

    let kv: Arc<dyn KvStore> = Arc::new(
        MemoryKvStore::with_capacity(std::num::NonZeroUsize::new(1).expect("non-zero"))
            .without_atomic_incr(),
    );
    let store = Arc::new(MemoryStore::default());
    let state = build_state(kv, store.clone());
    let app = pulse::infra::http::build_router(state.clone());

    send(&app, post("/api/posts/p1/views")).await;
    send(&app, post("/api/posts/p2/views")).await;
    send(&app, get("/api/tags/popular")).await;
    state.counters.flush().await.expect("flush");

    store.set_offline(true);
    send(&app, post("/api/posts/p3/views")).await;
    store.set_offline(false);
    state
        .counters
        .increment_view(&PostId::parse("p4").expect("post id"))
        .await
        .expect("increment");
    store.set_offline(true);
    assert!(state.counters.flush().await.is_err());

    let names: HashSet<String> = snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite, _, _, _)| composite.key().name().to_string())
        .collect();

    let expected = [
        "pulse_counter_increment_total",
        "pulse_kv_evict_total",
        "pulse_counter_flush_total",
        "pulse_counter_flush_ms",
        "pulse_tag_sync_ms",
        "pulse_tag_index_size",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
    assert!(counter_value("pulse_counter_flush_total", ("result", "error")) >= 1);
}
