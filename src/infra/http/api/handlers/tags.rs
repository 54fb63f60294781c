//! Tag search, popularity and trending handlers

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;

use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::parse_limit;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn search_tags(
    State(state): State<ApiState>,
    Query(query): Query<TagSearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), state.limits.tags)?;
    let needle = query.q.unwrap_or_default();
    let tags = state.tags.search_tags(&needle, limit).await?;
    Ok(Json(TagSearchResponse { tags }))
}

pub async fn popular_tags(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), state.limits.tags)?;
    let tags = state.tags.popular_tags(limit).await?;
    Ok(Json(PopularTagsResponse { tags }))
}

pub async fn trending_hashtags(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), state.limits.trending)?;
    let hashtags = state.trending.trending(limit).await?;
    Ok(Json(TrendingResponse { hashtags }))
}
