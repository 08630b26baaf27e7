//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries so they
//! do not wait for a read to be cleaned up.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheStrategy;

/// Spawns a background task that calls `cleanup()` on `cache` every
/// `cleanup_interval_secs` seconds.
///
/// Backend failures are logged and the loop keeps going. Abort the returned
/// handle to stop it.
///
/// # Example
/// ```ignore
/// let cache = create_strategy(&config)?;
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 60);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(
    cache: Arc<dyn CacheStrategy>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            strategy = cache.name(),
            "Starting cache cleanup task with interval of {} seconds", cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.cleanup().await {
                Ok(removed) if removed > 0 => {
                    info!("Cache cleanup: removed {} expired entries", removed);
                }
                Ok(_) => debug!("Cache cleanup: no expired entries found"),
                Err(e) => warn!(error = %e, "Cache cleanup failed"),
            }
        }
    })
}
