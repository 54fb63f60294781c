//! API handlers grouped by resource.

mod counters;
mod followers;
mod tags;

pub use counters::*;
pub use followers::*;
pub use tags::*;

use crate::domain::types::{PostId, UserId};

use super::error::ApiError;

fn parse_post_id(raw: &str) -> Result<PostId, ApiError> {
    PostId::parse(raw).map_err(ApiError::from)
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    UserId::parse(raw).map_err(ApiError::from)
}
