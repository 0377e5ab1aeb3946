//! Lookup table of listings providers

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::provider::{HttpListingProvider, ListingProvider};
use super::{ListingsError, ProviderKey};
use crate::config::ListingsArgs;

/// Provider summary for the admin UI
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub key: ProviderKey,
    pub name: String,
    pub enabled: bool,
}

#[derive(Default)]
pub struct ListingRegistry {
    providers: BTreeMap<ProviderKey, Arc<dyn ListingProvider>>,
}

impl ListingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every known provider from configuration. Providers missing
    /// their base URL or credential are registered but disabled.
    pub fn from_args(args: &ListingsArgs) -> Self {
        let timeout = Duration::from_millis(args.listings_timeout_ms);
        let mut registry = Self::new();

        registry.register(HttpListingProvider::mls(
            args.mls_api_base_url.as_deref(),
            args.mls_api_client_id.as_deref(),
            args.mls_api_client_secret.as_deref(),
            timeout,
        ));
        registry.register(
            HttpListingProvider::api_key(
                ProviderKey::Zillow,
                args.zillow_api_base_url.as_deref(),
                args.zillow_api_key.as_deref(),
                timeout,
            )
            .with_query("regionId", args.zillow_region_id.as_deref()),
        );
        for (key, base_url, api_key) in [
            (
                ProviderKey::Redfin,
                &args.redfin_api_base_url,
                &args.redfin_api_key,
            ),
            (
                ProviderKey::Realtor,
                &args.realtor_api_base_url,
                &args.realtor_api_key,
            ),
            (ProviderKey::Fsbo, &args.fsbo_api_base_url, &args.fsbo_api_key),
        ] {
            registry.register(HttpListingProvider::api_key(
                key,
                base_url.as_deref(),
                api_key.as_deref(),
                timeout,
            ));
        }

        let enabled: Vec<_> = registry
            .enabled_providers()
            .iter()
            .map(|p| p.key().as_str())
            .collect();
        info!("Listings providers enabled: {:?}", enabled);
        registry
    }

    pub fn register<P: ListingProvider + 'static>(&mut self, provider: P) {
        self.providers.insert(provider.key(), Arc::new(provider));
    }

    pub fn get(&self, key: ProviderKey) -> Option<Arc<dyn ListingProvider>> {
        self.providers.get(&key).cloned()
    }

    /// Resolve a provider by its raw path key
    pub fn lookup(&self, raw: &str) -> Result<Arc<dyn ListingProvider>, ListingsError> {
        let key: ProviderKey = raw.parse()?;
        self.get(key)
            .ok_or_else(|| ListingsError::UnknownProvider(raw.to_string()))
    }

    pub fn enabled_providers(&self) -> Vec<Arc<dyn ListingProvider>> {
        self.providers
            .values()
            .filter(|p| p.enabled())
            .cloned()
            .collect()
    }

    pub fn describe(&self) -> Vec<ProviderInfo> {
        self.providers
            .values()
            .map(|p| ProviderInfo {
                key: p.key(),
                name: p.display_name().to_string(),
                enabled: p.enabled(),
            })
            .collect()
    }
}
