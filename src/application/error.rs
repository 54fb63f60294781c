use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::application::counters::CounterError;
use crate::application::followers::FollowerError;
use crate::application::repos::RepoError;
use crate::application::tags::TagCacheError;
use crate::application::trending::TrendingError;
use crate::cache::KvError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("cache unavailable")]
    CacheUnavailable(#[source] KvError),
    #[error("store unavailable")]
    StoreUnavailable(#[source] RepoError),
    #[error("contention on `{key}` after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Infra(_)
            | AppError::CacheUnavailable(_)
            | AppError::StoreUnavailable(_)
            | AppError::Contention { .. }
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients. Internal failures stay generic; the
    /// full chain goes to the logs through [`ErrorReport`].
    pub fn public_message(&self) -> String {
        match self {
            AppError::Domain(DomainError::Validation { message }) => message.clone(),
            AppError::Validation(message) => message.clone(),
            AppError::Unauthorized => "authentication required".to_string(),
            AppError::CacheUnavailable(_) => "cache temporarily unavailable".to_string(),
            AppError::StoreUnavailable(_) => "storage temporarily unavailable".to_string(),
            AppError::Contention { .. } => "too many concurrent updates, retry later".to_string(),
            AppError::Infra(_) | AppError::Unexpected(_) => "internal server error".to_string(),
        }
    }
}

impl From<CounterError> for AppError {
    fn from(error: CounterError) -> Self {
        match error {
            CounterError::Cache(err) => AppError::CacheUnavailable(err),
            CounterError::Store(err) => AppError::StoreUnavailable(err),
            CounterError::Contention { key, attempts } => AppError::Contention { key, attempts },
        }
    }
}

impl From<TagCacheError> for AppError {
    fn from(error: TagCacheError) -> Self {
        match error {
            TagCacheError::Domain(err) => AppError::Domain(err),
            TagCacheError::Repo(err) => AppError::StoreUnavailable(err),
        }
    }
}

impl From<FollowerError> for AppError {
    fn from(error: FollowerError) -> Self {
        match error {
            FollowerError::SelfFollow => {
                AppError::validation("users cannot follow themselves")
            }
            FollowerError::Cache(err) => AppError::CacheUnavailable(err),
            FollowerError::Store(err) => AppError::StoreUnavailable(err),
            FollowerError::Encode(err) => AppError::unexpected(err.to_string()),
        }
    }
}

impl From<TrendingError> for AppError {
    fn from(error: TrendingError) -> Self {
        match error {
            TrendingError::Cache(err) => AppError::CacheUnavailable(err),
            TrendingError::Store(err) => AppError::StoreUnavailable(err),
            TrendingError::Encode(err) => AppError::unexpected(err.to_string()),
        }
    }
}
