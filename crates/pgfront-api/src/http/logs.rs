//! Live log streaming endpoint.
//!
//! # Design
//! - Bridge structured tracing output to SSE without extra formatting layers.
//! - Allow clients to reconnect without holding server state.
//! - Emit keep-alive frames to keep proxies from closing idle streams.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{self, Sse},
};
use futures_util::StreamExt;
use pgfront_telemetry::log_stream_receiver;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::app::state::ApiState;
use crate::http::constants::SSE_KEEP_ALIVE_SECS;
use crate::http::errors::ApiError;

pub(crate) async fn stream_logs(
    State(_state): State<Arc<ApiState>>,
) -> Result<Sse<impl futures_core::Stream<Item = Result<sse::Event, Infallible>> + Send>, ApiError> {
    let stream = build_log_stream(log_stream_receiver());

    Ok(Sse::new(stream).keep_alive(sse::KeepAlive::new().interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS)).text("keep-alive")))
}

fn build_log_stream(receiver: broadcast::Receiver<String>) -> impl futures_core::Stream<Item = Result<sse::Event, Infallible>> + Send {
    BroadcastStream::new(receiver).filter_map(|result| async move {
        let event = match result {
            Ok(line) => sse::Event::default().event("log").data(line),
            Err(err) => sse::Event::default().event("log_status").data(log_status_message(&err)),
        };
        Some(Ok(event))
    })
}

fn log_status_message(err: &BroadcastStreamRecvError) -> String {
    match err {
        BroadcastStreamRecvError::Lagged(count) => format!("log stream lagged; dropped {count} lines"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use pgfront_config::ConfigService;
    use pgfront_events::EventBus;
    use pgfront_introspect::SchemaCache;
    use pgfront_storage::LocalBackend;
    use pgfront_telemetry::Metrics;
    use pgfront_test_support::start_postgres;
    use serde_json::json;
    use std::error::Error;
    use std::io;

    #[test]
    fn log_status_message_formats_lagged_count() {
        let err = BroadcastStreamRecvError::Lagged(3);
        assert_eq!(log_status_message(&err), "log stream lagged; dropped 3 lines");
    }

    #[tokio::test]
    async fn build_log_stream_emits_events_for_lines_and_lagged() -> Result<(), Box<dyn Error>> {
        let (sender, receiver) = broadcast::channel(1);
        let mut stream = Box::pin(build_log_stream(receiver));

        sender.send("alpha".to_string()).map_err(|_| io::Error::other("send failed"))?;
        sender.send("beta".to_string()).map_err(|_| io::Error::other("send failed"))?;
        assert!(matches!(stream.next().await, Some(Ok(_))));

        sender.send("gamma".to_string()).map_err(|_| io::Error::other("send failed"))?;
        assert!(matches!(stream.next().await, Some(Ok(_))));
        Ok(())
    }

    #[tokio::test]
    async fn stream_logs_builds_sse_response() -> anyhow::Result<()> {
        let database = match start_postgres() {
            Ok(database) => database,
            Err(error) => {
                eprintln!("skipping logs test: {error}");
                return Ok(());
            }
        };
        let config = ConfigService::new(database.connection_string(), b"logs-test-master-key-32bytes!!!".to_vec()).await?;
        let pool = config.pool().clone();
        let events = EventBus::with_capacity(4);
        let backend = Arc::new(LocalBackend::new(std::env::temp_dir().join(format!("pgfront-logs-test-{}", uuid::Uuid::new_v4()))));
        let storage = pgfront_storage::StorageService::new(pool.clone(), backend, config.clone(), events.clone(), Metrics::new()?);
        let state = Arc::new(ApiState::new(
            Arc::new(config),
            pool,
            SchemaCache::new(),
            storage,
            Metrics::new()?,
            Arc::new(json!({})),
            events,
            b"test-jwt-secret".to_vec(),
        ));

        let response = stream_logs(State(state)).await?.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        Ok(())
    }
}
