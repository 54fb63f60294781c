pub mod api;
mod middleware;

pub use api::{ApiLimits, ApiState, build_api_router};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Router, middleware as axum_middleware, routing::get};

use crate::application::error::ErrorReport;
use api::error::ApiError;

/// Full HTTP surface: JSON API, health probe, request context and response logging.
pub fn build_router(state: ApiState) -> Router {
    let health = Router::new()
        .route("/healthz", get(health_check))
        .with_state(state.clone());

    build_api_router(state)
        .merge(health)
        .fallback(not_found)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health_check(State(state): State<ApiState>) -> Response {
    if let Err(err) = state.store.ping().await {
        return unavailable("infra::http::health::store", &err);
    }
    if let Err(err) = state.kv.ping().await {
        return unavailable("infra::http::health::kv", &err);
    }
    StatusCode::NO_CONTENT.into_response()
}

fn unavailable(source: &'static str, err: &dyn std::error::Error) -> Response {
    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    ErrorReport::from_error(source, StatusCode::SERVICE_UNAVAILABLE, err).attach(&mut response);
    response
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}
