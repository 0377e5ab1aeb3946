//! Configuration for Dealroom
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

/// Minimum accepted HS256 secret length outside dev mode
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Document store backend
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Mongo,
}

/// Dealroom - deal lifecycle and stage workflow API
#[derive(Parser, Debug, Clone)]
#[command(name = "dealroom")]
#[command(about = "Deal lifecycle and stage workflow API for real-estate transactions")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (header identity, memory store fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Document store backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "mongo")]
    pub store_backend: StoreBackend,

    /// MongoDB connection URI. Must reach a replica set or mongos; stage
    /// seeding runs in multi-document transactions.
    #[arg(
        long,
        env = "MONGODB_URI",
        default_value = "mongodb://localhost:27017/?replicaSet=rs0"
    )]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "dealroom")]
    pub mongodb_db: String,

    /// HS256 secret used to verify bearer tokens (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Listings provider configuration
    #[command(flatten)]
    pub listings: ListingsArgs,
}

/// Listings provider endpoints and credentials. A provider is enabled once
/// its base URL and primary credential are set.
#[derive(Parser, Debug, Clone)]
pub struct ListingsArgs {
    /// MLS / RESO upstream base URL
    #[arg(long, env = "MLS_API_BASE_URL")]
    pub mls_api_base_url: Option<String>,

    #[arg(long, env = "MLS_API_CLIENT_ID")]
    pub mls_api_client_id: Option<String>,

    #[arg(long, env = "MLS_API_CLIENT_SECRET")]
    pub mls_api_client_secret: Option<String>,

    #[arg(long, env = "ZILLOW_API_BASE_URL")]
    pub zillow_api_base_url: Option<String>,

    #[arg(long, env = "ZILLOW_API_KEY")]
    pub zillow_api_key: Option<String>,

    /// Region forwarded to the Zillow upstream as `regionId`
    #[arg(long, env = "ZILLOW_REGION_ID")]
    pub zillow_region_id: Option<String>,

    #[arg(long, env = "REDFIN_API_BASE_URL")]
    pub redfin_api_base_url: Option<String>,

    #[arg(long, env = "REDFIN_API_KEY")]
    pub redfin_api_key: Option<String>,

    #[arg(long, env = "REALTOR_API_BASE_URL")]
    pub realtor_api_base_url: Option<String>,

    #[arg(long, env = "REALTOR_API_KEY")]
    pub realtor_api_key: Option<String>,

    #[arg(long, env = "FSBO_API_BASE_URL")]
    pub fsbo_api_base_url: Option<String>,

    #[arg(long, env = "FSBO_API_KEY")]
    pub fsbo_api_key: Option<String>,

    /// Timeout for provider requests in milliseconds
    #[arg(long, env = "LISTINGS_TIMEOUT_MS", default_value = "10000")]
    pub listings_timeout_ms: u64,
}

impl Args {
    /// Effective JWT secret. Dev mode falls back to a fixed insecure secret.
    pub fn jwt_secret(&self) -> Option<String> {
        match &self.jwt_secret {
            Some(secret) if !secret.is_empty() => Some(secret.clone()),
            _ if self.dev_mode => Some("dev-only-insecure-secret".to_string()),
            _ => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                    return Err(format!(
                        "JWT_SECRET must be at least {} characters",
                        MIN_JWT_SECRET_LEN
                    ))
                }
                Some(_) => {}
            }
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.store_backend == StoreBackend::Mongo && self.mongodb_uri.trim().is_empty() {
            return Err("MONGODB_URI is required for the mongo store backend".to_string());
        }

        Ok(())
    }
}
