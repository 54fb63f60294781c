//! Follower info and follow mutation handlers

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use super::parse_user_id;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::{MaybeViewer, Viewer};
use crate::infra::http::api::state::ApiState;

pub async fn get_follower_info(
    State(state): State<ApiState>,
    MaybeViewer(viewer): MaybeViewer,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let info = state
        .follows
        .get_for_viewer(&user_id, viewer.as_ref())
        .await?;
    Ok(Json(info))
}

/// Follow `user_id` as the viewer; responds with the refreshed follower info.
pub async fn follow_user(
    State(state): State<ApiState>,
    Viewer(viewer): Viewer,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state.follows.follow(&viewer, &user_id).await?;
    let info = state.follows.get_for_viewer(&user_id, Some(&viewer)).await?;
    Ok(Json(info))
}

pub async fn unfollow_user(
    State(state): State<ApiState>,
    Viewer(viewer): Viewer,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state.follows.unfollow(&viewer, &user_id).await?;
    let info = state.follows.get_for_viewer(&user_id, Some(&viewer)).await?;
    Ok(Json(info))
}
