//! Documentation endpoints.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::Value;

use crate::app::state::ApiState;

pub(crate) async fn openapi_document_handler(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json((*state.openapi_document).clone())
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

    #[tokio::test]
    async fn openapi_handler_clones_embedded_document() -> anyhow::Result<()> {
        let database = match start_postgres() {
            Ok(database) => database,
            Err(error) => {
                eprintln!("skipping docs test: {error}");
                return Ok(());
            }
        };
        let config = ConfigService::new(database.connection_string(), b"docs-test-master-key-32bytes!!!".to_vec()).await?;
        let pool = config.pool().clone();
        let events = EventBus::with_capacity(4);
        let backend = Arc::new(LocalBackend::new(std::env::temp_dir().join(format!("pgfront-docs-test-{}", uuid::Uuid::new_v4()))));
        let storage = pgfront_storage::StorageService::new(pool.clone(), backend, config.clone(), events.clone(), Metrics::new()?);
        let document = Arc::new(json!({"hello": "world"}));
        let state = Arc::new(ApiState::new(
            Arc::new(config),
            pool,
            SchemaCache::new(),
            storage,
            Metrics::new()?,
            Arc::clone(&document),
            events,
            b"test-jwt-secret".to_vec(),
        ));

        let Json(body) = openapi_document_handler(State(state)).await;
        assert_eq!(body, *document);
        Ok(())
    }
}
