//! Request extractors and parameter parsing shared by handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::config::LimitSettings;
use crate::domain::types::UserId;

use super::error::ApiError;

/// Header carrying the authenticated user, set by the upstream session layer.
pub const VIEWER_HEADER: &str = "x-user-id";

/// Authenticated viewer; rejects the request with 401 when absent.
#[derive(Debug, Clone)]
pub struct Viewer(pub UserId);

/// Viewer identity when one is supplied.
#[derive(Debug, Clone)]
pub struct MaybeViewer(pub Option<UserId>);

fn viewer_from_parts(parts: &Parts) -> Result<Option<UserId>, ApiError> {
    let Some(value) = parts.headers.get(VIEWER_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::bad_request(format!("{VIEWER_HEADER} must be valid ASCII")))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    UserId::parse(raw).map(Some).map_err(ApiError::from)
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_parts(parts)?
            .map(Viewer)
            .ok_or_else(ApiError::unauthorized)
    }
}

impl<S> FromRequestParts<S> for MaybeViewer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_parts(parts).map(MaybeViewer)
    }
}

/// Parse an optional `limit` query value against configured bounds.
pub fn parse_limit(raw: Option<&str>, limits: LimitSettings) -> Result<usize, ApiError> {
    let max = limits.max.get();
    let value = match raw.map(str::trim) {
        None | Some("") => limits.default.get(),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|value| (1..=max).contains(value))
            .ok_or_else(|| {
                ApiError::bad_request(format!("limit must be an integer between 1 and {max}"))
            })?,
    };
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use axum::http::StatusCode;

    use super::*;

    fn limits() -> LimitSettings {
        LimitSettings {
            default: NonZeroU32::new(10).expect("non-zero"),
            max: NonZeroU32::new(50).expect("non-zero"),
        }
    }

    #[test]
    fn limit_defaults_and_bounds() {
        assert_eq!(parse_limit(None, limits()).expect("default"), 10);
        assert_eq!(parse_limit(Some(" "), limits()).expect("default"), 10);
        assert_eq!(parse_limit(Some("50"), limits()).expect("max"), 50);
        for bad in ["0", "51", "-1", "ten"] {
            let err = parse_limit(Some(bad), limits()).expect_err("rejected");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }
}
