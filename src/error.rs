//! Domain error taxonomy and its HTTP mapping.
//!
//! Components return their own error types (`StoreError`, `UpstreamError`);
//! the API facade converts everything into [`ApiError`], which renders as
//! `{"detail": ...}` with the status codes pinned by the error table.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{collector::CollectError, store::StoreError, upstream::UpstreamError};

/// One field-level schema violation, FastAPI-style `{loc, msg, type}`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn new(loc: &[&str], msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc: loc.iter().map(|s| s.to_string()).collect(),
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("schema validation failed")]
    Schema(Vec<FieldError>),
    #[error("API key required")]
    AuthRequired,
    #[error("{0} not found")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    #[error("store unavailable: {0}")]
    Store(String),
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::AuthRequired => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::AlreadyRunning(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Schema(fields) => json!({ "detail": fields }),
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err.to_string())
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::RateLimited => ApiError::RateLimited,
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<CollectError> for ApiError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::AlreadyRunning(job) => ApiError::AlreadyRunning(job),
            CollectError::Store(e) => e.into(),
            CollectError::Upstream(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_table() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::AuthRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::not_found("ticker 000000").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::AlreadyRunning("collect-all").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Upstream("fetch failed".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn schema_errors_render_field_list() {
        let err = ApiError::Schema(vec![FieldError::new(
            &["body", "days"],
            "days must be positive",
            "value_error",
        )]);
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
