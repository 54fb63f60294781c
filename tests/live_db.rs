//! Repository behaviour against a real Postgres. Needs `DATABASE_URL`:
//! `cargo test --test live_db -- --ignored`.

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

use pulse::application::repos::{CountersRepo, FollowsRepo, HealthCheck, TagsRepo};
use pulse::domain::types::{CounterKey, PostId, SharePlatform, UserId};
use pulse::infra::db::PostgresRepositories;

fn post(raw: &str) -> PostId {
    PostId::parse(raw).expect("post id")
}

fn user(raw: &str) -> UserId {
    UserId::parse(raw).expect("user id")
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn counters_upsert_never_lowers_a_value(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let views = CounterKey::view(post("p1"));
    let shares = CounterKey::share(post("p1"), SharePlatform::Twitter);

    assert_eq!(repos.load_counter(&views).await.expect("load"), 0);

    repos
        .store_counters(&[(views.clone(), 8), (shares.clone(), 2)])
        .await
        .expect("store");
    repos
        .store_counters(&[(views.clone(), 5)])
        .await
        .expect("stale store");

    assert_eq!(repos.load_counter(&views).await.expect("load"), 8);
    assert_eq!(repos.load_counter(&shares).await.expect("load"), 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn tag_assignments_drive_usage_and_trending(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let changed = repos
        .record_post_tags(&post("p1"), &["rust".to_string(), "tokio".to_string()])
        .await
        .expect("record");
    assert_eq!(changed.len(), 2);
    repos
        .record_post_tags(&post("p2"), &["rust".to_string()])
        .await
        .expect("record");

    let mut usage = repos.recount_tags().await.expect("recount");
    usage.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(usage[0].name, "rust");
    assert_eq!(usage[0].usage_count, 2);
    assert_eq!(usage[1].usage_count, 1);

    let since = OffsetDateTime::now_utc() - Duration::hours(24);
    let trending = repos.trending_hashtags(since, 10).await.expect("trending");
    assert_eq!(trending[0].tag, "rust");
    assert_eq!(trending[0].post_count, 2);

    let released = repos.release_post_tags(&post("p1")).await.expect("release");
    assert!(released.iter().any(|t| t.name == "tokio" && t.usage_count == 0));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn follow_edges_are_idempotent(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let (alice, bob) = (user("alice"), user("bob"));

    assert!(repos.insert_follow(&bob, &alice).await.expect("insert"));
    assert!(!repos.insert_follow(&bob, &alice).await.expect("insert again"));
    assert!(repos.is_following(&bob, &alice).await.expect("check"));

    let counts = repos.follower_counts(&alice).await.expect("counts");
    assert_eq!(counts.follower_count, 1);
    assert_eq!(counts.following_count, 0);

    assert!(repos.delete_follow(&bob, &alice).await.expect("delete"));
    assert!(!repos.delete_follow(&bob, &alice).await.expect("delete again"));
    repos.ping().await.expect("ping");
}
