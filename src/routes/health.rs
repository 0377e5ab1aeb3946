//! Liveness check for /health and /healthz

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Document store backend in use
    pub store: &'static str,
    pub mode: &'static str,
    pub enabled_listing_providers: usize,
    pub timestamp: String,
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let body = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.backend(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        enabled_listing_providers: state.listings.enabled_providers().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    json_response(StatusCode::OK, &body)
}
