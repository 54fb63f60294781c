pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::{ApiLimits, ApiState};

use axum::{
    Router,
    routing::{get, post},
};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/posts/{post_id}/views",
            get(handlers::get_views).post(handlers::record_view),
        )
        .route(
            "/api/posts/{post_id}/shares",
            get(handlers::get_shares).post(handlers::record_share),
        )
        .route("/api/tags/search", get(handlers::search_tags))
        .route("/api/tags/popular", get(handlers::popular_tags))
        .route("/api/hashtags/trending", get(handlers::trending_hashtags))
        .route(
            "/api/users/{user_id}/followers",
            get(handlers::get_follower_info),
        )
        .route(
            "/api/users/{user_id}/follow",
            post(handlers::follow_user).delete(handlers::unfollow_user),
        )
        .with_state(state)
}
