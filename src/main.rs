//! Dealroom binary
//!
//! Usage:
//!   dealroom --dev-mode --store-backend memory
//!   dealroom --mongodb-uri 'mongodb://localhost:27017/?replicaSet=rs0' --jwt-secret <secret>

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dealroom::config::StoreBackend;
use dealroom::db::{DocumentStore, MemoryStore, MongoStore};
use dealroom::{server, AppState, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dealroom={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("========================================");
    info!("  Dealroom v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "development" } else { "production" });
    info!("Store backend: {:?}", args.store_backend);

    let store = open_store(&args).await?;

    let state = AppState::new(args, store)?;
    for provider in state.listings.describe() {
        info!(
            "Listings provider {}: {}",
            provider.name,
            if provider.enabled { "enabled" } else { "not configured" }
        );
    }

    server::run(Arc::new(state)).await?;
    Ok(())
}

/// Open the configured store. In dev mode an unreachable MongoDB falls back
/// to the in-memory store.
async fn open_store(args: &Args) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match args.store_backend {
        StoreBackend::Memory => {
            warn!("Using in-memory document store - data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Mongo => {
            match MongoStore::connect(&args.mongodb_uri, &args.mongodb_db).await {
                Ok(store) => {
                    info!("MongoDB connected (database: {})", store.db_name());
                    Ok(Arc::new(store))
                }
                Err(e) if args.dev_mode => {
                    warn!("MongoDB unavailable ({}), falling back to in-memory store", e);
                    Ok(Arc::new(MemoryStore::new()))
                }
                Err(e) => {
                    error!("Failed to connect to MongoDB: {}", e);
                    Err(e.into())
                }
            }
        }
    }
}
