//! Tagged Cache - expiry sweeper
//!
//! Runs the background cleanup task against the configured cache strategy
//! until interrupted.

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagged_cache::{create_strategy, spawn_cleanup_task, Config};

/// Main entry point for the cache sweeper.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the configured cache strategy and report its stats
/// 4. Start background cleanup task
/// 5. On SIGINT/SIGTERM, stop the task and close the strategy
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagged_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tagged cache sweeper");

    let config = Config::from_env().context("failed to load cache configuration")?;
    info!(
        "Configuration loaded: strategy={}, default_ttl={:?}ms, cleanup_interval={}s",
        config.strategy, config.default_ttl, config.cleanup_interval
    );

    let cache = create_strategy(&config).context("failed to create cache strategy")?;
    let stats = cache
        .stats()
        .await
        .with_context(|| format!("cannot reach {} cache backend", cache.name()))?;
    info!(
        "Cache ready: {} entries ({} expired)",
        stats.size, stats.expired
    );

    let cleanup_handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval);

    shutdown_signal().await;

    cleanup_handle.abort();
    warn!("Cleanup task aborted");

    cache.close().await.context("failed to close cache strategy")?;
    info!("Sweeper shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
