//! # oremus-server
//!
//! HTTP backend for the Oremus prayer network.
//!
//! This binary provides:
//! - **REST API** (axum) for accounts, groups, prayers, corporate prayer
//!   campaigns, and notifications
//! - **Keyset-paginated feeds** ordered by prayer activity
//! - **Local blob storage** for profile, banner, and prayer media
//! - **In-app notification fan-out** with a pluggable push sink

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod push;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use oremus_engine::{Engine, EngineConfig};
use oremus_store::Database;

use crate::api::AppState;
use crate::auth::TokenIsUserId;
use crate::blob_store::LocalBlobStore;
use crate::config::ServerConfig;
use crate::push::LogSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,oremus_server=debug")),
        )
        .init();

    info!("Starting Oremus server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Database (creates parent directories if missing)
    let database = Database::open_at(&config.database_path)?;
    let db = Arc::new(Mutex::new(database));

    // Blob store (creates directory if missing)
    let blobs = Arc::new(
        LocalBlobStore::new(config.blob_storage_path.clone(), config.max_blob_size).await?,
    );

    let engine = Engine::new(
        db.clone(),
        blobs.clone(),
        Arc::new(LogSink),
        EngineConfig {
            pray_cooldown_secs: config.pray_cooldown_secs,
        },
    );

    let resolver = Arc::new(TokenIsUserId::new(db));

    let app_state = AppState {
        engine,
        resolver,
        blobs,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
