//! Background tasks that run alongside the HTTP server for the lifetime of
//! the process: the schema watcher and the expired chunked-upload sweeper.

use std::time::Duration;

use pgfront_introspect::SchemaWatcher;
use pgfront_storage::StorageService;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Default interval between sweeps of expired chunked upload sessions.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the catalog watcher, which keeps the schema cache fresh for the
/// lifetime of the returned handle.
#[must_use]
pub fn spawn_schema_watcher(watcher: SchemaWatcher) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = watcher.run().await {
            error!(error = %err, "schema watcher terminated");
        }
    })
}

/// Spawn a task that periodically aborts expired chunked upload sessions.
///
/// Runs forever; intended to be aborted alongside the rest of the process on
/// shutdown rather than awaited to completion.
#[must_use]
pub fn spawn_upload_sweeper(storage: StorageService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match storage.sweep_expired_sessions().await {
                Ok(0) => {}
                Ok(swept) => info!(swept, "expired chunked upload sessions swept"),
                Err(err) => error!(error = %err, "upload session sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sweep_interval_is_positive() {
        assert!(DEFAULT_SWEEP_INTERVAL > Duration::ZERO);
    }
}
