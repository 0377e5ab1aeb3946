//! Persist fetched listings as property records
//!
//! Each listing is merged into `properties/{provider}_{externalId}`, the
//! record a deal's `propertyId` points at. Only the fields the listing
//! carries are written, so fields set by other flows survive.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{ExternalListing, IngestResult, ProviderKey};
use crate::db::{CollectionPath, DocPath, DocumentStore, Fields, SetMode};
use crate::types::StoreError;

pub const PROPERTIES_COLLECTION: &str = "properties";

/// Counters for one ingest run
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub attempted: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Deterministic property id; spaces in the external id become dashes
pub fn property_id(provider: ProviderKey, external_id: &str) -> String {
    format!("{}_{}", provider, external_id.trim().replace(' ', "-"))
}

fn property_path(provider: ProviderKey, external_id: &str) -> Result<DocPath, StoreError> {
    CollectionPath::root(PROPERTIES_COLLECTION)?.doc(&property_id(provider, external_id))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Fields merged into the property record. `createdAt` is added by the caller
/// on first insert.
pub fn property_fields(listing: &ExternalListing, now: DateTime<Utc>) -> Fields {
    let mut address = Map::new();
    let parts = [
        ("street", &listing.address.street1),
        ("city", &listing.address.city),
        ("state", &listing.address.state),
        ("postalCode", &listing.address.postal),
    ];
    for (name, value) in parts {
        if let Some(value) = non_blank(value) {
            address.insert(name.to_string(), json!(value));
        }
    }
    let lat = listing.lat.or(listing.address.lat).filter(|v| *v != 0.0);
    let lng = listing.lng.or(listing.address.lng).filter(|v| *v != 0.0);
    if let (Some(lat), Some(lng)) = (lat, lng) {
        address.insert(
            "coordinates".to_string(),
            json!({ "latitude": lat, "longitude": lng }),
        );
    }

    let mut fields = Fields::new();
    fields.insert("source".to_string(), json!(listing.source));
    fields.insert("externalId".to_string(), json!(listing.external_id));
    if !address.is_empty() {
        fields.insert("address".to_string(), Value::Object(address));
    }
    if listing.list_price > 0.0 {
        fields.insert("price".to_string(), json!(listing.list_price));
    }
    if let Some(beds) = listing.beds.filter(|v| *v > 0.0) {
        fields.insert("bedrooms".to_string(), json!(beds as i64));
    }
    if let Some(baths) = listing.baths.filter(|v| *v > 0.0) {
        fields.insert("bathrooms".to_string(), json!(baths));
    }
    if let Some(sqft) = listing.sqft.filter(|v| *v > 0.0) {
        fields.insert("squareFeet".to_string(), json!(sqft as i64));
    }
    if let Some(status) = non_blank(&listing.status) {
        fields.insert("status".to_string(), json!(status));
    }
    if listing.source == ProviderKey::Mls {
        fields.insert("mlsId".to_string(), json!(listing.external_id));
    }
    fields.insert("updatedAt".to_string(), json!(now));
    fields
}

pub struct ListingIngestor {
    store: Arc<dyn DocumentStore>,
}

impl ListingIngestor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Merge every listing of `result` into its property record.
    ///
    /// Per-listing failures are logged and counted as skipped.
    pub async fn upsert(&self, result: &IngestResult) -> UpsertSummary {
        let mut summary = UpsertSummary::default();

        for listing in &result.listings {
            summary.attempted += 1;

            if listing.external_id.trim().is_empty() {
                warn!("Skipping {} listing with empty external id", result.provider);
                summary.skipped += 1;
                continue;
            }

            match self.upsert_one(listing).await {
                Ok(true) => summary.created += 1,
                Ok(false) => summary.updated += 1,
                Err(e) => {
                    warn!(
                        "Failed to store {} listing {}: {}",
                        result.provider, listing.external_id, e
                    );
                    summary.skipped += 1;
                }
            }
        }

        info!(
            "Ingested {} listings from {}: {} created, {} updated, {} skipped",
            summary.attempted, result.provider, summary.created, summary.updated, summary.skipped
        );
        summary
    }

    /// Returns true when the record was created
    async fn upsert_one(&self, listing: &ExternalListing) -> Result<bool, StoreError> {
        let path = property_path(listing.source, &listing.external_id)?;
        let created = match self.store.get(&path).await {
            Ok(_) => false,
            Err(StoreError::NotFound(_)) => true,
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        let mut fields = property_fields(listing, now);
        if created {
            fields.insert("createdAt".to_string(), json!(now));
        }
        self.store.set(&path, fields, SetMode::Merge).await?;
        Ok(created)
    }
}
