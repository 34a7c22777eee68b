//! Storefront Cache sidecar
//!
//! Serves the cache manager and network worker over HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_cache::api::{create_router, AppState};
use storefront_cache::{spawn_cleanup_task, spawn_event_listener, Config, SharedCache};

/// Main entry point for the sidecar.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache, warming coordinator and network worker
/// 4. Start the expiry sweep and the invalidation event listener
/// 5. Warm essential data in the background
/// 6. Serve HTTP until SIGINT/SIGTERM, then dispose the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Storefront Cache sidecar");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, upstream={}, max_items={}, cleanup={}s, version={}",
        config.server_port,
        config.upstream_url,
        config.persistent_max_items,
        config.cleanup_interval,
        config.network.version
    );

    let (state, worker_handle) = AppState::from_config(&config)
        .await
        .context("failed to initialize cache components")?;
    info!("Cache and network worker initialized");

    let cleanup_handle = spawn_cleanup_task(state.cache.clone(), config.cleanup_interval);
    let listener_handle =
        spawn_event_listener(state.invalidation.clone(), state.cache.on_invalidation_event());

    let warming = state.warming.clone();
    tokio::spawn(async move {
        warming.warm_essential_data().await;
    });

    let cache = state.cache.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            vec![cleanup_handle, listener_handle, worker_handle],
            cache,
        ))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown, aborts the background tasks and drops the memory tier.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>, cache: SharedCache) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    for task in tasks {
        task.abort();
    }
    warn!("Background tasks aborted");

    cache.dispose().await;
}
