//! HTTP listings connector

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Address, ExternalListing, FetchParams, IngestResult, ListingsError, ProviderKey};

/// Implemented by each external listings connector
#[async_trait]
pub trait ListingProvider: Send + Sync {
    fn key(&self) -> ProviderKey;

    fn display_name(&self) -> &str;

    /// Whether the provider has the configuration it needs
    fn enabled(&self) -> bool;

    /// Fetch one page of listings. Fails with `NotConfigured` when disabled.
    async fn fetch_listings(&self, params: &FetchParams) -> Result<IngestResult, ListingsError>;
}

/// Upstream payload shape
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamPage {
    #[serde(default)]
    listings: Vec<UpstreamListing>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamListing {
    #[serde(default)]
    external_id: String,
    #[serde(default)]
    address: Address,
    #[serde(default)]
    list_price: f64,
    beds: Option<f64>,
    baths: Option<f64>,
    sqft: Option<f64>,
    lat: Option<f64>,
    lng: Option<f64>,
    status: Option<String>,
    listed_at: Option<String>,
    updated_at: Option<String>,
}

/// Unparseable timestamps are dropped rather than failing the page
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl UpstreamListing {
    fn normalize(self, source: ProviderKey) -> ExternalListing {
        ExternalListing {
            listed_at: parse_timestamp(self.listed_at.as_deref()),
            updated_at: parse_timestamp(self.updated_at.as_deref()),
            external_id: self.external_id,
            source,
            address: self.address,
            list_price: self.list_price,
            beds: self.beds,
            baths: self.baths,
            sqft: self.sqft,
            lat: self.lat,
            lng: self.lng,
            status: self.status.filter(|s| !s.is_empty()),
        }
    }
}

/// A provider reached over HTTP, parameterised by credential headers and
/// extra query parameters
pub struct HttpListingProvider {
    key: ProviderKey,
    base_url: Option<String>,
    /// Headers sent on every request; the first one is the required credential
    headers: Vec<(&'static str, String)>,
    extra_query: Vec<(&'static str, String)>,
    timeout: Duration,
    http_client: reqwest::Client,
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl HttpListingProvider {
    pub fn new(key: ProviderKey, base_url: Option<&str>, timeout: Duration) -> Self {
        let http_client = match reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("dealroom/0.1")
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build HTTP client for {}, using defaults: {}", key, e);
                reqwest::Client::new()
            }
        };

        Self {
            key,
            base_url: present(base_url),
            headers: Vec::new(),
            extra_query: Vec::new(),
            timeout,
            http_client,
        }
    }

    /// Add a header. Empty values are skipped.
    pub fn with_header(mut self, name: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = present(value) {
            self.headers.push((name, value));
        }
        self
    }

    /// Add a fixed query parameter. Empty values are skipped.
    pub fn with_query(mut self, name: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = present(value) {
            self.extra_query.push((name, value));
        }
        self
    }

    /// MLS / RESO upstream: client id is required, secret optional
    pub fn mls(
        base_url: Option<&str>,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self::new(ProviderKey::Mls, base_url, timeout)
            .with_header("X-MLS-Client-ID", client_id)
            .with_header("X-MLS-Client-Secret", client_secret)
    }

    /// Portal upstream authenticated with an API key
    pub fn api_key(
        key: ProviderKey,
        base_url: Option<&str>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self::new(key, base_url, timeout).with_header("X-API-Key", api_key)
    }

    /// `{base}/listings` with the fetch parameters as query string. A path on
    /// the base URL is kept as a prefix.
    pub fn request_url(&self, params: &FetchParams) -> Result<Url, ListingsError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(ListingsError::NotConfigured(self.key))?;
        let mut url =
            Url::parse(base).map_err(|e| ListingsError::InvalidBaseUrl(self.key, e.to_string()))?;
        let path = format!("{}/listings", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            let region = &params.region;
            if let Some(city) = present(region.city.as_deref()) {
                query.append_pair("city", &city);
            }
            if let Some(state) = present(region.state.as_deref()) {
                query.append_pair("state", &state);
            }
            if let Some(postal) = present(region.postal_code.as_deref()) {
                query.append_pair("postalCode", &postal);
            }
            if let Some(since) = params.since {
                query.append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            if let Some(limit) = params.limit.filter(|l| *l > 0) {
                query.append_pair("limit", &limit.to_string());
            }
            if let Some(token) = present(params.page_token.as_deref()) {
                query.append_pair("pageToken", &token);
            }
            if params.include_sold {
                query.append_pair("includeSold", "true");
            }
            for (name, value) in &self.extra_query {
                query.append_pair(name, value);
            }
        }

        // Drop a dangling `?` when nothing was appended
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}

#[async_trait]
impl ListingProvider for HttpListingProvider {
    fn key(&self) -> ProviderKey {
        self.key
    }

    fn display_name(&self) -> &str {
        self.key.display_name()
    }

    fn enabled(&self) -> bool {
        self.base_url.is_some() && !self.headers.is_empty()
    }

    async fn fetch_listings(&self, params: &FetchParams) -> Result<IngestResult, ListingsError> {
        if !self.enabled() {
            return Err(ListingsError::NotConfigured(self.key));
        }
        let url = self.request_url(params)?;
        debug!(provider = %self.key, url = %url, "Fetching listings");

        let mut request = self.http_client.get(url).timeout(self.timeout);
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ListingsError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ListingsError::UpstreamStatus(response.status().as_u16()));
        }

        let page: UpstreamPage = response
            .json()
            .await
            .map_err(|e| ListingsError::InvalidPayload(e.to_string()))?;

        Ok(IngestResult {
            provider: self.key,
            listings: page
                .listings
                .into_iter()
                .map(|l| l.normalize(self.key))
                .collect(),
            next_page: present(page.next_page_token.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::RegionFilter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_enabled_requires_base_url_and_credential() {
        let p = HttpListingProvider::mls(Some("https://mls.test"), None, Some("s"), TIMEOUT);
        assert!(!p.enabled());

        let p = HttpListingProvider::mls(Some("  "), Some("id"), None, TIMEOUT);
        assert!(!p.enabled());

        let p = HttpListingProvider::mls(Some("https://mls.test"), Some("id"), None, TIMEOUT);
        assert!(p.enabled());
    }

    #[test]
    fn test_request_url() {
        let p = HttpListingProvider::api_key(
            ProviderKey::Zillow,
            Some("https://zillow.test/api/v2"),
            Some("k"),
            TIMEOUT,
        )
        .with_query("regionId", Some("R42"));

        let params = FetchParams {
            since: Some("2025-03-01T12:00:00Z".parse().unwrap()),
            region: RegionFilter {
                city: Some("Austin".into()),
                state: Some("TX".into()),
                ..Default::default()
            },
            limit: Some(50),
            page_token: None,
            include_sold: true,
        };
        let url = p.request_url(&params).unwrap();
        assert_eq!(url.path(), "/api/v2/listings");
        assert_eq!(
            url.query(),
            Some(
                "city=Austin&state=TX&since=2025-03-01T12%3A00%3A00Z&limit=50\
                 &includeSold=true&regionId=R42"
            )
        );

        let bare = p.request_url(&FetchParams::default()).unwrap();
        assert_eq!(bare.as_str(), "https://zillow.test/api/v2/listings?regionId=R42");
    }

    #[tokio::test]
    async fn test_fetch_unconfigured() {
        let p = HttpListingProvider::api_key(ProviderKey::Redfin, None, None, TIMEOUT);
        let err = p.fetch_listings(&FetchParams::default()).await.unwrap_err();
        assert!(matches!(err, ListingsError::NotConfigured(ProviderKey::Redfin)));
    }

    /// Serve one canned HTTP response and hand back the raw request
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_fetch_normalizes_payload() {
        let body = r#"{
            "listings": [{
                "externalId": "A-1",
                "address": {"street1": "1 Main St", "city": "Austin"},
                "listPrice": 350000,
                "beds": 3,
                "status": "active",
                "listedAt": "2025-02-01T00:00:00Z",
                "updatedAt": "not a date"
            }],
            "nextPageToken": "p2"
        }"#;
        let (base, server) = serve_once("200 OK", body).await;

        let p = HttpListingProvider::mls(Some(&base), Some("client-1"), Some("shh"), TIMEOUT);
        let result = p.fetch_listings(&FetchParams::default()).await.unwrap();

        assert_eq!(result.provider, ProviderKey::Mls);
        assert_eq!(result.next_page.as_deref(), Some("p2"));
        let listing = &result.listings[0];
        assert_eq!(listing.external_id, "A-1");
        assert_eq!(listing.source, ProviderKey::Mls);
        assert_eq!(listing.beds, Some(3.0));
        assert!(listing.listed_at.is_some());
        assert!(listing.updated_at.is_none());

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /listings "));
        assert!(request.contains("x-mls-client-id: client-1"));
        assert!(request.contains("x-mls-client-secret: shh"));
    }

    #[tokio::test]
    async fn test_fetch_honours_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let p = HttpListingProvider::api_key(
            ProviderKey::Realtor,
            Some(&base),
            Some("k"),
            Duration::from_millis(200),
        );
        let started = std::time::Instant::now();
        let err = p.fetch_listings(&FetchParams::default()).await.unwrap_err();
        assert!(matches!(err, ListingsError::Network(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_fetch_upstream_error_status() {
        let (base, _server) = serve_once("502 Bad Gateway", "{}").await;
        let p = HttpListingProvider::api_key(ProviderKey::Fsbo, Some(&base), Some("k"), TIMEOUT);
        let err = p.fetch_listings(&FetchParams::default()).await.unwrap_err();
        assert!(matches!(err, ListingsError::UpstreamStatus(502)));
    }
}
