//! CacheMachine - A two-tier byte cache server
//!
//! Serves one tiered cache over HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cachemachine::api::{create_router, AppState};
use cachemachine::Config;

/// Main entry point for the CacheMachine server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the tiered cache
/// 4. Enable the persistent tier and its sync task if a path is configured
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM, stop the sync task and shut down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachemachine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CacheMachine");

    let config = Config::from_env();
    info!(
        "Configuration loaded: memory_capacity={}, max_item_size={}, disk_path={:?}, disk_capacity={}, sync_interval={}s, port={}",
        config.memory_capacity,
        config.max_item_size,
        config.disk_path,
        config.disk_capacity,
        config.sync_interval,
        config.server_port
    );

    let state = AppState::from_config(&config).context("invalid cache configuration")?;

    if let Some(path) = &config.disk_path {
        state
            .cache
            .enable_persistent_tier(config.disk_capacity, path)
            .await
            .context("failed to enable persistent tier")?;
        info!("Persistent tier enabled at {}", path.display());
    }

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.cache.disable_persistent_tier().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
}
