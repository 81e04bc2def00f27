//! JSON error envelopes shared by every route.
//!
//! Each envelope carries the numeric status, a stable `IPDB-xxx` message and,
//! for request and server failures, the underlying error text.

use std::fmt::Display;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub const ERR_BAD_REQUEST: &str = "IPDB-001 - Use correct request format";
pub const ERR_NOT_FOUND: &str = "IPDB-003 - Resource not found";
pub const ERR_SERVER: &str = "IPDB-004 - Server error";
pub const ERR_RATE_LIMIT_EXCEEDED: &str = "IPDB-005 - Rate limit exceeded";

pub fn bad_request_response(err: impl Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "status": StatusCode::BAD_REQUEST.as_u16(),
            "message": ERR_BAD_REQUEST,
            "error": err.to_string(),
        })),
    )
        .into_response()
}

pub fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": StatusCode::NOT_FOUND.as_u16(),
            "message": ERR_NOT_FOUND,
        })),
    )
        .into_response()
}

pub fn server_error_response(err: impl Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            "message": ERR_SERVER,
            "error": err.to_string(),
        })),
    )
        .into_response()
}

/// 429 with a `Retry-After` header in whole seconds, rounded up.
pub fn rate_limit_exceeded_response(retry_after: Duration) -> Response {
    let secs = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
            "message": ERR_RATE_LIMIT_EXCEEDED,
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
    response
}

/// Router fallback for unknown paths.
pub async fn fallback() -> Response {
    not_found_response()
}
