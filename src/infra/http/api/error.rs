use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::counters::CounterError;
use crate::application::error::{AppError, ErrorReport};
use crate::application::followers::FollowerError;
use crate::application::tags::TagCacheError;
use crate::application::trending::TrendingError;
use crate::domain::error::DomainError;

const SOURCE: &str = "infra::http::api::error";

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, report: ErrorReport) -> Self {
        Self {
            status,
            message: message.into(),
            report,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        let report = ErrorReport::from_message(SOURCE, StatusCode::BAD_REQUEST, message.clone());
        Self::new(StatusCode::BAD_REQUEST, message, report)
    }

    pub fn unauthorized() -> Self {
        let status = StatusCode::UNAUTHORIZED;
        let report = ErrorReport::from_message(SOURCE, status, "missing viewer identity");
        Self::new(status, "authentication required", report)
    }

    pub fn not_found() -> Self {
        let status = StatusCode::NOT_FOUND;
        let report = ErrorReport::from_message(SOURCE, status, "no route matched");
        Self::new(status, "not found", report)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        let status = error.status_code();
        let report = ErrorReport::from_error("application::error::AppError", status, &error);
        Self::new(status, error.public_message(), report)
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        AppError::from(error).into()
    }
}

impl From<CounterError> for ApiError {
    fn from(error: CounterError) -> Self {
        AppError::from(error).into()
    }
}

impl From<TagCacheError> for ApiError {
    fn from(error: TagCacheError) -> Self {
        AppError::from(error).into()
    }
}

impl From<FollowerError> for ApiError {
    fn from(error: FollowerError) -> Self {
        AppError::from(error).into()
    }
}

impl From<TrendingError> for ApiError {
    fn from(error: TrendingError) -> Self {
        AppError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
