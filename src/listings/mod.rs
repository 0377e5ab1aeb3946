//! External listings providers
//!
//! Each provider is an upstream service exposing `GET {base}/listings` and
//! returning listings already mapped to [`ExternalListing`]. Providers
//! differ only in credential headers and extra query parameters, so a single
//! [`HttpListingProvider`] is configured per [`ProviderKey`]. Fetched pages
//! are stored as property records by [`ListingIngestor`].

pub mod ingest;
pub mod provider;
pub mod registry;

pub use ingest::{ListingIngestor, UpsertSummary, PROPERTIES_COLLECTION};
pub use provider::{HttpListingProvider, ListingProvider};
pub use registry::{ListingRegistry, ProviderInfo};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKey {
    Mls,
    Zillow,
    Redfin,
    Realtor,
    Fsbo,
}

impl ProviderKey {
    pub const ALL: [ProviderKey; 5] = [
        ProviderKey::Mls,
        ProviderKey::Zillow,
        ProviderKey::Redfin,
        ProviderKey::Realtor,
        ProviderKey::Fsbo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKey::Mls => "mls",
            ProviderKey::Zillow => "zillow",
            ProviderKey::Redfin => "redfin",
            ProviderKey::Realtor => "realtor",
            ProviderKey::Fsbo => "fsbo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKey::Mls => "MLS / RESO",
            ProviderKey::Zillow => "Zillow",
            ProviderKey::Redfin => "Redfin",
            ProviderKey::Realtor => "Realtor.com",
            ProviderKey::Fsbo => "For Sale By Owner",
        }
    }
}

impl FromStr for ProviderKey {
    type Err = ListingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ProviderKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| ListingsError::UnknownProvider(s.to_string()))
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lat/lng bounding box for map-style searches
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Geographic region to search
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

/// How many listings to fetch and from when
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub region: RegionFilter,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub include_sold: bool,
}

/// Mailing address plus coordinates
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// A listing normalised across providers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalListing {
    pub external_id: String,
    pub source: ProviderKey,
    pub address: Address,
    pub list_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baths: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqft: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of listings returned by a provider
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub provider: ProviderKey,
    pub listings: Vec<ExternalListing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListingsError {
    #[error("Provider not configured: {0}")]
    NotConfigured(ProviderKey),

    #[error("Unknown listings provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid base URL for {0}: {1}")]
    InvalidBaseUrl(ProviderKey, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {0}")]
    UpstreamStatus(u16),

    #[error("Invalid provider payload: {0}")]
    InvalidPayload(String),
}
