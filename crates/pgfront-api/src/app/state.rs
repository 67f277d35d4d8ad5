//! API application state, health tracking, and rate limiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use pgfront_config::{ApiKeyRateLimit, ConfigResult};
use pgfront_events::{Event as CoreEvent, EventBus};
use pgfront_introspect::SchemaCache;
use pgfront_storage::StorageService;
use pgfront_telemetry::Metrics;
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;

use crate::config::SharedConfig;
use crate::http::rate_limit::{RateLimitError, RateLimitSnapshot, RateLimiter};

/// Whether the instance is still waiting for its first API key ("setup") or
/// already has at least one issued ("active").
///
/// There is no stored mode field: the signal is derived on demand from
/// [`pgfront_config::SettingsFacade::has_api_keys`], so a key issued through
/// any path immediately closes the setup surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMode {
    /// No API key has been issued yet; only the setup endpoints are open.
    Setup,
    /// At least one API key exists; the setup endpoints are closed.
    Active,
}

impl BootstrapMode {
    /// Derive the current mode from the settings backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn resolve(config: &SharedConfig) -> ConfigResult<Self> {
        Ok(if config.has_api_keys().await? {
            Self::Active
        } else {
            Self::Setup
        })
    }
}

/// Shared state reachable from every HTTP handler.
pub struct ApiState {
    pub(crate) config: SharedConfig,
    pub(crate) pool: PgPool,
    pub(crate) schema_cache: SchemaCache,
    pub(crate) storage: StorageService,
    pub(crate) setup_token_ttl: Duration,
    pub(crate) telemetry: Metrics,
    pub(crate) openapi_document: Arc<Value>,
    pub(crate) events: EventBus,
    pub(crate) jwt_secret: Vec<u8>,
    health_status: Mutex<Vec<String>>,
    rate_limiters: Mutex<HashMap<String, RateLimiter>>,
}

impl ApiState {
    /// Construct application state from already-initialized dependencies.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SharedConfig,
        pool: PgPool,
        schema_cache: SchemaCache,
        storage: StorageService,
        telemetry: Metrics,
        openapi_document: Arc<Value>,
        events: EventBus,
        jwt_secret: Vec<u8>,
    ) -> Self {
        Self {
            config,
            pool,
            schema_cache,
            storage,
            setup_token_ttl: Duration::from_secs(900),
            telemetry,
            openapi_document,
            events,
            jwt_secret,
            health_status: Mutex::new(Vec::new()),
            rate_limiters: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn add_degraded_component(&self, component: &str) -> bool {
        let mut guard = Self::lock_guard(&self.health_status, "health_status");
        if guard.iter().any(|entry| entry == component) {
            return false;
        }
        guard.push(component.to_string());
        guard.sort();
        guard.dedup();
        let snapshot = guard.clone();
        drop(guard);
        let _ = self.events.publish(CoreEvent::HealthChanged { degraded: snapshot });
        true
    }

    pub(crate) fn remove_degraded_component(&self, component: &str) -> bool {
        let mut guard = Self::lock_guard(&self.health_status, "health_status");
        let previous = guard.len();
        guard.retain(|entry| entry != component);
        if guard.len() == previous {
            return false;
        }
        let snapshot = guard.clone();
        drop(guard);
        let _ = self.events.publish(CoreEvent::HealthChanged { degraded: snapshot });
        true
    }

    pub(crate) fn current_health_degraded(&self) -> Vec<String> {
        Self::lock_guard(&self.health_status, "health_status").clone()
    }

    pub(crate) fn enforce_rate_limit(
        &self,
        key_id: &str,
        limit: Option<&ApiKeyRateLimit>,
    ) -> Result<Option<RateLimitSnapshot>, RateLimitError> {
        limit.map_or_else(
            || {
                if self.add_degraded_component("api_rate_limit_guard") {
                    warn!("api key guard rail triggered: missing or unlimited rate limit");
                }
                Ok(None)
            },
            |limit| {
                self.remove_degraded_component("api_rate_limit_guard");
                let mut guard = Self::lock_guard(&self.rate_limiters, "rate_limiters");
                let limiter = guard
                    .entry(key_id.to_string())
                    .or_insert_with(|| RateLimiter::new(limit.clone()));
                let now = Instant::now();
                let status = limiter.evaluate(limit, now);
                drop(guard);
                if status.allowed {
                    Ok(Some(RateLimitSnapshot {
                        limit: limit.burst,
                        remaining: status.remaining,
                    }))
                } else {
                    self.telemetry.inc_rate_limit_throttled();
                    warn!(api_key = %key_id, "API key rate limit exceeded");
                    Err(RateLimitError {
                        limit: limit.burst,
                        retry_after: status.retry_after,
                    })
                }
            },
        )
    }

    fn lock_guard<'a, T>(mutex: &'a Mutex<T>, name: &'a str) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|err| {
            panic!("failed to lock {name}: {err}");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfront_config::ConfigService;
    use pgfront_storage::LocalBackend;
    use pgfront_test_support::start_postgres;
    use serde_json::json;
    use tokio_stream::StreamExt;

    async fn build_state(events: EventBus) -> anyhow::Result<Option<ApiState>> {
        let database = match start_postgres() {
            Ok(database) => database,
            Err(error) => {
                eprintln!("skipping app::state test: {error}");
                return Ok(None);
            }
        };
        let config = ConfigService::new(
            database.connection_string(),
            b"app-state-test-master-key-32byt".to_vec(),
        )
        .await?;
        let pool = config.pool().clone();
        let backend = Arc::new(LocalBackend::new(std::env::temp_dir().join(format!(
            "pgfront-app-state-test-{}",
            uuid::Uuid::new_v4()
        ))));
        let storage = StorageService::new(pool.clone(), backend, config.clone(), events.clone(), Metrics::new()?);
        Ok(Some(ApiState::new(
            Arc::new(config),
            pool,
            SchemaCache::new(),
            storage,
            Metrics::new()?,
            Arc::new(json!({})),
            events,
            b"test-jwt-secret".to_vec(),
        )))
    }

    #[tokio::test]
    async fn add_and_remove_degraded_components_emit_events() -> anyhow::Result<()> {
        let events = EventBus::with_capacity(4);
        let Some(state) = build_state(events.clone()).await? else {
            return Ok(());
        };
        let mut stream = events.subscribe(None);

        assert!(state.add_degraded_component("db"));
        assert!(!state.add_degraded_component("db"));

        let envelope = stream
            .next()
            .await
            .expect("health event emitted")
            .expect("stream recv error");
        assert!(matches!(envelope.event, CoreEvent::HealthChanged { .. }));
        assert!(state.remove_degraded_component("db"));
        Ok(())
    }

    #[tokio::test]
    async fn enforce_rate_limit_without_config_marks_guard_degraded() -> anyhow::Result<()> {
        let Some(state) = build_state(EventBus::with_capacity(4)).await? else {
            return Ok(());
        };

        assert!(state.enforce_rate_limit("key-1", None)?.is_none());
        assert!(state.current_health_degraded().contains(&"api_rate_limit_guard".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn enforce_rate_limit_throttles_past_burst() -> anyhow::Result<()> {
        let Some(state) = build_state(EventBus::with_capacity(4)).await? else {
            return Ok(());
        };
        let limit = ApiKeyRateLimit {
            burst: 1,
            replenish_period: Duration::from_secs(60),
        };

        assert!(state.enforce_rate_limit("key-1", Some(&limit))?.is_some());
        assert!(state.enforce_rate_limit("key-1", Some(&limit)).is_err());
        Ok(())
    }
}
