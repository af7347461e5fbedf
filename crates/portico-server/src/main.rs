//! # portico-server
//!
//! HTTP boundary for the Portico document repository.
//!
//! This binary provides:
//! - **REST API** (axum) wrapping every store operation in an endpoint that
//!   resolves the caller's externally-authenticated identity and enforces
//!   the admin gate before any mutation
//! - **File storage** for published documents (the catalog holds only the
//!   retrieval URL issued here)
//! - **Admin bootstrap** seeding the admin registry from configuration on
//!   startup

mod api;
mod blob_store;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use portico_store::Database;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,portico_server=debug")),
        )
        .init();

    info!("Starting Portico document service v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store: runs migrations, seeds the admin registry, and
    //    resolves the file path handlers reopen per request
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    for uid in &config.admin_uids {
        db.set_admin(uid, true)?;
    }
    let db_path = db
        .path()
        .ok_or_else(|| anyhow::anyhow!("database has no filesystem path"))?;
    drop(db);

    // -----------------------------------------------------------------------
    // 4. Initialize the blob store
    // -----------------------------------------------------------------------
    let blob_store = BlobStore::new(
        config.blob_storage_path.clone(),
        config.public_url.clone(),
        config.max_upload_size,
    )
    .await?;

    // -----------------------------------------------------------------------
    // 5. Serve the API
    // -----------------------------------------------------------------------
    let state = AppState {
        db_path,
        blob_store: Arc::new(blob_store),
        config: Arc::new(config.clone()),
    };
    let router = api::build_router(state);

    info!(addr = %config.http_addr, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
