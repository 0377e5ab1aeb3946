//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo. Every request runs as its own task under
//! the configured request timeout.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::Authenticator;
use crate::config::Args;
use crate::db::DocumentStore;
use crate::deals::DealService;
use crate::listings::{ListingIngestor, ListingRegistry};
use crate::routes;
use crate::types::{DealError, Result};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn DocumentStore>,
    pub deals: DealService,
    pub auth: Authenticator,
    pub listings: ListingRegistry,
    pub ingestor: ListingIngestor,
}

impl AppState {
    /// Build state from configuration around an already connected store
    pub fn new(args: Args, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let auth = Authenticator::from_args(&args)?;
        let listings = ListingRegistry::from_args(&args.listings);
        Ok(Self::with_parts(args, store, auth, listings))
    }

    pub fn with_parts(
        args: Args,
        store: Arc<dyn DocumentStore>,
        auth: Authenticator,
        listings: ListingRegistry,
    ) -> Self {
        Self {
            deals: DealService::new(store.clone()),
            ingestor: ListingIngestor::new(store.clone()),
            store,
            auth,
            listings,
            args,
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.args.request_timeout_ms)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Dealroom listening on {} (store: {})",
        state.args.listen,
        state.store.backend()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - X-User-Id header identity accepted");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Read the body, then route under the request timeout
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    info!("[{}] {} {}", addr, parts.method, path);

    let work = async {
        let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body from {}: {}", addr, e);
                return body_error_response(&*e);
            }
        };
        dispatch(&state, &parts.method, &path, &parts.headers, &body).await
    };

    let response = match tokio::time::timeout(state.request_timeout(), work).await {
        Ok(response) => response,
        Err(_) => {
            warn!("[{}] {} {} timed out", addr, parts.method, path);
            routes::error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "Request timed out",
                "TIMEOUT",
            )
        }
    };
    Ok(response)
}

fn body_error_response(err: &(dyn std::error::Error + Send + Sync + 'static)) -> Response<Full<Bytes>> {
    if err.is::<LengthLimitError>() {
        return routes::error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
            "PAYLOAD_TOO_LARGE",
        );
    }
    routes::deal_error_response(DealError::InvalidArgument(
        "request body unreadable".to_string(),
    ))
}

/// Route one request. Public so tests can drive the API without a socket.
pub async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return routes::health_check(state)
        }
        (&Method::OPTIONS, _) => return routes::preflight_response(),
        _ => {}
    }

    if !path.starts_with("/api/") {
        return routes::not_found_response(path);
    }

    let user = match state.auth.authenticate(headers) {
        Ok(user) => user,
        Err(e) => {
            debug!("Rejected unauthenticated request to {}: {}", path, e);
            return routes::deal_error_response(e);
        }
    };

    if let Some(response) =
        routes::handle_deals_request(state, method, path, &user, body).await
    {
        return response;
    }
    if let Some(response) =
        routes::handle_listings_request(state, method, path, &user, body).await
    {
        return response;
    }
    routes::not_found_response(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let body = Limited::new(Full::new(Bytes::from(vec![b'x'; 64])), 16);
        let Err(err) = body.collect().await else {
            panic!("body over the limit was accepted");
        };
        let response = body_error_response(&*err);
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = Limited::new(Full::new(Bytes::from_static(b"{}")), 16);
        assert!(body.collect().await.is_ok());
    }

    #[test]
    fn test_other_body_errors_are_bad_requests() {
        let err: Box<dyn std::error::Error + Send + Sync> = "connection reset".into();
        let response = body_error_response(&*err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
