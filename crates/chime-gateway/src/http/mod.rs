//! HTTP handlers for the job and observability APIs.

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub mod jobs;
pub mod observability;

/// Error half of every handler result: a status plus `{"error": ...}` body.
pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// 500 with the error's display text as the body.
pub(crate) fn internal_error(e: impl std::fmt::Display) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
