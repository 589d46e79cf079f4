//! Expiry Sweep Task
//!
//! Background task that periodically removes expired elements from every
//! region served by the peer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheValue, LocalCacheManager};

/// Spawns a background task that periodically sweeps expired elements.
///
/// Reads already drop expired elements lazily; the sweep keeps untouched
/// regions from holding on to them.
///
/// # Arguments
/// * `manager` - Regions to sweep
/// * `cleanup_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task<K: CacheKey, V: CacheValue>(
    manager: Arc<LocalCacheManager<K, V>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = manager.cleanup_expired();
            if removed > 0 {
                info!("Expiry sweep: removed {} expired elements", removed);
            } else {
                debug!("Expiry sweep: no expired elements found");
            }
        }
    })
}
