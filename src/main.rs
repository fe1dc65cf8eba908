//! Portal Cache - caching data-access service for a course-materials portal
//!
//! Composition root: builds every cache tier from one configuration, wires
//! them into the data-access facade and serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_cache::api::{create_router, AppState};
use portal_cache::cache::{FlatCache, LayeredCache, RequestDeduplicator};
use portal_cache::clock::{SharedClock, SystemClock};
use portal_cache::remote::InMemoryRemoteStore;
use portal_cache::storage::{
    BlobBackend, DurableBlobStore, FileBlobBackend, MemoryBlobBackend, MemoryKeyValueStore,
};
use portal_cache::{spawn_cleanup_task, Config, Portal};

/// Main entry point for the portal cache service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the persisted tier, blob store and caches from one policy table
/// 4. Start background cleanup task
/// 5. Serve the HTTP API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Portal Cache service");

    let config = Config::from_env();
    info!(
        port = config.server_port,
        cleanup_interval = config.cleanup_interval,
        response_window = config.response_window,
        flat_cache_ttl = config.flat_cache_ttl,
        default_ttl = config.default_ttl,
        "configuration loaded"
    );

    let clock: SharedClock = Arc::new(SystemClock);
    let policy = config.ttl_policy();

    let persisted = Arc::new(match config.persisted_quota_bytes {
        Some(quota) => MemoryKeyValueStore::with_quota(quota),
        None => MemoryKeyValueStore::new(),
    });

    let backend: Arc<dyn BlobBackend> = match &config.blob_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "using directory blob store");
            Arc::new(FileBlobBackend::new(dir.clone()))
        }
        None => Arc::new(MemoryBlobBackend::new()),
    };
    let blob = Arc::new(DurableBlobStore::new(backend, clock.clone()));
    blob.ensure_ready().await;

    let layered = Arc::new(LayeredCache::new(
        persisted.clone(),
        blob,
        policy.clone(),
        clock.clone(),
        config.cache_prefix.clone(),
    ));
    let flat = FlatCache::new(persisted, policy.flat_ttl_ms(), clock.clone());
    let dedup = RequestDeduplicator::new(policy.response_window_ms(), clock);

    let remote = Arc::new(InMemoryRemoteStore::new());
    let portal = Portal::new(remote, layered.clone(), flat, dedup.clone());
    info!("Data-access facade initialized");

    let cleanup_handle = spawn_cleanup_task(layered, dedup, config.cleanup_interval);

    let app = create_router(AppState::new(portal));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the cleanup task.
///
/// A signal handler that cannot be installed is logged and never fires.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Cleanup task aborted");
}
