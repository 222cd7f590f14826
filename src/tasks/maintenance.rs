//! Cache Maintenance Task
//!
//! Background task that periodically trims the disk cache and compacts its
//! journal.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::record::DiskCache;

/// Spawns a background task that periodically runs [`DiskCache::compact`].
///
/// The task loops forever, sleeping for `interval_secs` between passes. Each
/// pass runs on the blocking thread pool since cache I/O is synchronous. An
/// interval of zero is treated as one second.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(DiskCache::open(CacheConfig::from_env())?);
/// let maintenance = spawn_maintenance_task(cache.clone(), 60);
/// // Later, during shutdown:
/// maintenance.abort();
/// ```
pub fn spawn_maintenance_task(cache: Arc<DiskCache>, interval_secs: u64) -> JoinHandle<()> {
    let interval_secs = interval_secs.max(1);
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting disk cache maintenance task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let pass_cache = Arc::clone(&cache);
            let outcome = tokio::task::spawn_blocking(move || pass_cache.compact()).await;

            match outcome {
                Ok(Ok(report)) if report.evicted > 0 || report.journal_rebuilt => {
                    info!(
                        "Maintenance: evicted {} entries, journal rebuilt: {}",
                        report.evicted, report.journal_rebuilt
                    );
                }
                Ok(Ok(_)) => debug!("Maintenance: nothing to do"),
                Ok(Err(e)) => warn!("Maintenance pass failed: {}", e),
                Err(e) => warn!("Maintenance pass did not complete: {}", e),
            }
        }
    })
}
