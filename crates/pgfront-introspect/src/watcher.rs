//! Catalog-change detection: `LISTEN/NOTIFY` with a polling fallback.
//!
//! Resolves the open question in the schema-cache design notes: rather than
//! relying solely on a long-lived `LISTEN` connection (which can silently
//! drop under connection pooling or network blips), the watcher alternates
//! between listening and, on any listener error, falling back to polling at
//! a fixed interval until it can reattach. This mirrors the settings
//! watcher's `listen_once`/`poll_once`/`try_reattach_listen` resilience
//! pattern used elsewhere in this workspace.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tracing::{error, warn};

use crate::error::IntrospectError;
use crate::introspector::SchemaIntrospector;

/// Channel name used by the `ddl_command_end` event trigger installed by the
/// bootstrap migration.
pub const SCHEMA_CHANGE_CHANNEL: &str = "pgfront_schema";

/// Default interval between polling attempts when `LISTEN` is unavailable.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Drives [`SchemaIntrospector::refresh`] in response to catalog changes,
/// forever, until cancelled.
pub struct SchemaWatcher {
    pool: PgPool,
    introspector: SchemaIntrospector,
    poll_interval: Duration,
}

impl SchemaWatcher {
    /// Construct a watcher bound to a connection pool and introspector.
    #[must_use]
    pub fn new(pool: PgPool, introspector: SchemaIntrospector) -> Self {
        Self {
            pool,
            introspector,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the polling fallback interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the watch loop until the process is shut down.
    ///
    /// The first iteration always performs a refresh, so route tables and
    /// function descriptors are populated before any request is served.
    ///
    /// # Errors
    ///
    /// Returns an error only if the very first refresh fails; after that,
    /// refresh failures are logged and retried rather than propagated.
    pub async fn run(&self) -> Result<(), IntrospectError> {
        self.introspector.refresh().await?;

        loop {
            match self.try_reattach_listen().await {
                Ok(mut listener) => self.listen_loop(&mut listener).await,
                Err(err) => {
                    warn!(error = %err, "schema listener unavailable; polling instead");
                    self.poll_loop().await;
                }
            }
        }
    }

    async fn try_reattach_listen(&self) -> Result<PgListener, IntrospectError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(IntrospectError::Listen)?;
        listener
            .listen(SCHEMA_CHANGE_CHANNEL)
            .await
            .map_err(IntrospectError::Listen)?;
        Ok(listener)
    }

    /// Consume notifications until the listener connection fails, then
    /// return control to `run` so it can fall back to polling and attempt to
    /// reattach.
    async fn listen_loop(&self, listener: &mut PgListener) {
        loop {
            match listener.recv().await {
                Ok(_notification) => self.refresh_once().await,
                Err(err) => {
                    error!(error = %err, "schema change listener connection lost");
                    return;
                }
            }
        }
    }

    /// Poll at a fixed interval. Runs until a listener can be reattached
    /// (callers re-enter `run`'s loop, which attempts reattachment first).
    async fn poll_loop(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.refresh_once().await;
            if self.try_reattach_listen().await.is_ok() {
                return;
            }
        }
    }

    async fn refresh_once(&self) {
        if let Err(err) = self.introspector.refresh().await {
            error!(error = %err, "schema refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_interval_is_positive() {
        assert!(DEFAULT_POLL_INTERVAL > Duration::ZERO);
    }

    #[test]
    fn schema_change_channel_name_is_stable() {
        assert_eq!(SCHEMA_CHANGE_CHANNEL, "pgfront_schema");
    }
}
