//! Health and metrics endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use tracing::{error, warn};

use crate::app::state::ApiState;
use crate::http::errors::ApiError;
use pgfront_api_models::{HealthCheckView, HealthView};

async fn ping_database(state: &ApiState) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(&state.pool).await.map(|_| ())
}

/// `GET /health` — coarse liveness check: reachable database, nothing else.
pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Result<Json<HealthView>, ApiError> {
    match ping_database(&state).await {
        Ok(()) => {
            state.remove_degraded_component("database");
            Ok(Json(HealthView {
                status: "ok".to_string(),
                checks: Vec::new(),
            }))
        }
        Err(err) => {
            state.add_degraded_component("database");
            warn!(error = %err, "health check failed to reach database");
            Err(ApiError::service_unavailable("database is currently unavailable"))
        }
    }
}

/// `GET /health/full` — per-dependency diagnostic checks.
pub(crate) async fn health_full(State(state): State<Arc<ApiState>>) -> Json<HealthView> {
    let mut checks = Vec::new();

    match ping_database(&state).await {
        Ok(()) => {
            state.remove_degraded_component("database");
            checks.push(HealthCheckView {
                name: "database".to_string(),
                healthy: true,
                detail: None,
            });
        }
        Err(err) => {
            state.add_degraded_component("database");
            checks.push(HealthCheckView {
                name: "database".to_string(),
                healthy: false,
                detail: Some(err.to_string()),
            });
        }
    }

    let catalog = state.schema_cache.current();
    checks.push(HealthCheckView {
        name: "schema_cache".to_string(),
        healthy: true,
        detail: Some(format!("version {}, {} tables, {} functions", catalog.version, catalog.tables.len(), catalog.functions.len())),
    });

    let degraded = state.current_health_degraded();
    for component in &degraded {
        if component != "database" {
            checks.push(HealthCheckView {
                name: component.clone(),
                healthy: false,
                detail: None,
            });
        }
    }

    let status = if degraded.is_empty() { "ok" } else { "degraded" };
    Json(HealthView {
        status: status.to_string(),
        checks,
    })
}

/// `GET /metrics` — Prometheus text exposition.
pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfront_config::ConfigService;
    use pgfront_events::EventBus;
    use pgfront_introspect::SchemaCache;
    use pgfront_storage::LocalBackend;
    use pgfront_telemetry::Metrics;
    use pgfront_test_support::start_postgres;
    use serde_json::json;

    async fn build_state() -> anyhow::Result<Option<ApiState>> {
        let database = match start_postgres() {
            Ok(database) => database,
            Err(error) => {
                eprintln!("skipping health test: {error}");
                return Ok(None);
            }
        };
        let config = ConfigService::new(database.connection_string(), b"health-test-master-key-32bytes!".to_vec()).await?;
        let pool = config.pool().clone();
        let events = EventBus::with_capacity(4);
        let backend = Arc::new(LocalBackend::new(std::env::temp_dir().join(format!("pgfront-health-test-{}", uuid::Uuid::new_v4()))));
        let storage = pgfront_storage::StorageService::new(pool.clone(), backend, config.clone(), events.clone(), Metrics::new()?);
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
    async fn health_success_clears_degraded_component() -> anyhow::Result<()> {
        let Some(state) = build_state().await? else {
            return Ok(());
        };
        let state = Arc::new(state);
        state.add_degraded_component("database");

        let response = health(State(state.clone())).await.expect("health ok");
        assert_eq!(response.0.status, "ok");
        assert!(state.current_health_degraded().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn health_full_reports_schema_cache_check() -> anyhow::Result<()> {
        let Some(state) = build_state().await? else {
            return Ok(());
        };
        let state = Arc::new(state);

        let Json(body) = health_full(State(state)).await;
        assert!(body.checks.iter().any(|check| check.name == "schema_cache" && check.healthy));
        Ok(())
    }
}
