use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::binance::FetchError;

/// Unified error type for hub API responses.
#[derive(Debug)]
pub enum HubError {
    BadRequest(String),
    NotFound(String),
    /// Upstream exchange failure that exhausted its retries.
    Upstream(String),
    /// Storage is unreachable or failing.
    Storage(String),
    Internal(String),
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad_request: {msg}"),
            Self::NotFound(msg) => write!(f, "not_found: {msg}"),
            Self::Upstream(msg) => write!(f, "upstream_error: {msg}"),
            Self::Storage(msg) => write!(f, "storage_error: {msg}"),
            Self::Internal(msg) => write!(f, "internal_error: {msg}"),
        }
    }
}

impl std::error::Error for HubError {}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Upstream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Storage(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        let body = json!({ "success": false, "error": error });
        (status, axum::Json(body)).into_response()
    }
}

impl From<cast_store::StoreError> for HubError {
    fn from(e: cast_store::StoreError) -> Self {
        use cast_store::StoreError;
        match e {
            StoreError::UnknownSymbol(s) => Self::NotFound(format!("unknown symbol: {s}")),
            StoreError::InvalidSymbol(s) => Self::BadRequest(format!("invalid symbol: {s}")),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<FetchError> for HubError {
    fn from(e: FetchError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
