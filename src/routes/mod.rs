//! HTTP routes for Dealroom

pub mod deals;
pub mod health;
pub mod listings;

pub use deals::handle_deals_request;
pub use health::health_check;
pub use listings::handle_listings_request;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::error;

use crate::types::DealError;

/// API error body
#[derive(Debug, Serialize)]
struct ApiError<'a> {
    error: &'a str,
    code: &'a str,
}

fn fallback_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(r#"{"error":"Internal error"}"#)));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Build a JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec(body) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return fallback_response();
        }
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| fallback_response())
}

/// Build a JSON error response
pub fn error_response(status: StatusCode, message: &str, code: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ApiError {
            error: message,
            code,
        },
    )
}

/// Map a workflow error to its HTTP response. Internal details are logged,
/// not returned.
pub fn deal_error_response(err: DealError) -> Response<Full<Bytes>> {
    if let DealError::Internal(detail) = &err {
        error!("Internal error: {}", detail);
    }
    let code = err.code();
    let (status, message) = err.into_status_code_and_body();
    error_response(status, &message, code)
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Headers",
            "Authorization, Content-Type, X-User-Id, X-User-Role",
        )
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| fallback_response())
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("No route for {}", path),
        "NOT_FOUND",
    )
}

pub fn method_not_allowed_response() -> Response<Full<Bytes>> {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "Method not allowed",
        "METHOD_NOT_ALLOWED",
    )
}

/// Decode a JSON request body. An empty body decodes as `{}`.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, DealError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| DealError::InvalidArgument(format!("invalid JSON body: {}", e)))
}
