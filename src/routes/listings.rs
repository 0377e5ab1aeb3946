//! Listings provider routes (admin only)
//!
//! - `GET  /api/listings/providers`: registered providers and whether each
//!   is configured
//! - `POST /api/listings/{provider}/fetch`: fetch one page from a provider
//!   and merge it into `properties`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use serde_json::json;
use tracing::{error, info};

use super::{
    deal_error_response, error_response, json_response, method_not_allowed_response, parse_json,
};
use crate::deals::UserContext;
use crate::listings::{FetchParams, ListingsError};
use crate::server::AppState;
use crate::types::DealError;

fn listings_error_response(err: ListingsError) -> Response<Full<Bytes>> {
    match err {
        ListingsError::UnknownProvider(key) => error_response(
            StatusCode::NOT_FOUND,
            &format!("Unknown listings provider: {}", key),
            "UNKNOWN_PROVIDER",
        ),
        ListingsError::NotConfigured(key) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &format!(
                "Provider {} is not configured; set its base URL and credentials",
                key
            ),
            "PROVIDER_NOT_CONFIGURED",
        ),
        other => {
            error!("Listings fetch failed: {}", other);
            error_response(
                StatusCode::BAD_GATEWAY,
                "Failed to fetch listings from provider",
                "PROVIDER_ERROR",
            )
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ListingsRoute<'a> {
    Providers,
    Fetch(&'a str),
}

fn parse_route(path: &str) -> Option<ListingsRoute<'_>> {
    let rest = path.strip_prefix("/api/listings/")?.trim_end_matches('/');
    match rest.split_once('/') {
        None if rest == "providers" => Some(ListingsRoute::Providers),
        Some((provider, "fetch")) if !provider.is_empty() => Some(ListingsRoute::Fetch(provider)),
        _ => None,
    }
}

/// Handle an authenticated request under `/api/listings`.
/// Returns `None` when the path is not a listings route.
pub async fn handle_listings_request(
    state: &AppState,
    method: &Method,
    path: &str,
    user: &UserContext,
    body: &[u8],
) -> Option<Response<Full<Bytes>>> {
    let route = parse_route(path)?;

    if !user.is_admin() {
        return Some(deal_error_response(DealError::PermissionDenied(
            "admin role required".to_string(),
        )));
    }

    let response = match (method, route) {
        (&Method::GET, ListingsRoute::Providers) => json_response(
            StatusCode::OK,
            &json!({ "providers": state.listings.describe() }),
        ),
        (&Method::POST, ListingsRoute::Fetch(provider)) => fetch(state, provider, body).await,
        _ => method_not_allowed_response(),
    };
    Some(response)
}

async fn fetch(state: &AppState, provider: &str, body: &[u8]) -> Response<Full<Bytes>> {
    let provider = match state.listings.lookup(provider) {
        Ok(provider) => provider,
        Err(e) => return listings_error_response(e),
    };
    let params: FetchParams = match parse_json(body) {
        Ok(params) => params,
        Err(e) => return deal_error_response(e),
    };

    let result = match provider.fetch_listings(&params).await {
        Ok(result) => result,
        Err(e) => return listings_error_response(e),
    };
    info!(
        "Fetched {} listings from {}",
        result.listings.len(),
        result.provider
    );

    let summary = state.ingestor.upsert(&result).await;
    json_response(
        StatusCode::OK,
        &json!({
            "provider": result.provider,
            "fetched": result.listings.len(),
            "nextPage": result.next_page,
            "listings": result.listings,
            "attempted": summary.attempted,
            "created": summary.created,
            "updated": summary.updated,
            "skipped": summary.skipped,
        }),
    )
}
