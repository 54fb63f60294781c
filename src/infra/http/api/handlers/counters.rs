//! View and share counter handlers

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::domain::types::SharePlatform;

use super::parse_post_id;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn record_view(
    State(state): State<ApiState>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&post_id)?;
    let views = state.counters.increment_view(&post_id).await?;
    Ok(Json(ViewsResponse { post_id, views }))
}

pub async fn get_views(
    State(state): State<ApiState>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&post_id)?;
    let views = state.counters.view_count(&post_id).await?;
    Ok(Json(ViewsResponse { post_id, views }))
}

pub async fn record_share(
    State(state): State<ApiState>,
    Path(post_id): Path<String>,
    payload: Result<Json<ShareRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&post_id)?;
    let Json(payload) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let platform: SharePlatform = payload.platform.parse()?;

    let count = state.counters.increment_share(&post_id, platform).await?;
    Ok(Json(ShareResponse {
        post_id,
        platform,
        count,
    }))
}

pub async fn get_shares(
    State(state): State<ApiState>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&post_id)?;
    let stats = state.counters.share_stats(&post_id).await?;
    Ok(Json(ShareStatsResponse {
        post_id,
        total: stats.total,
        platforms: stats.platforms,
    }))
}
