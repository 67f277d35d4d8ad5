//! Server-sent events: a typed, filterable replay of the process event bus.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{self, Sse};
use futures_util::{future, StreamExt};
use pgfront_events::{Event, EventBus, EventEnvelope, EventId};
use serde::Deserialize;
use tracing::error;

use crate::app::state::ApiState;
use crate::http::constants::{EVENT_KIND_WHITELIST, HEADER_LAST_EVENT_ID, SSE_KEEP_ALIVE_SECS};
use crate::http::errors::ApiError;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SseQuery {
    #[serde(default)]
    pub(crate) event: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SseFilter {
    pub(crate) event_kinds: std::collections::HashSet<String>,
}

/// `GET /admin/events` — stream domain events as they are published.
///
/// Supports `Last-Event-ID` replay and an `?event=kind1,kind2` filter over
/// [`Event::kind`].
pub(crate) async fn stream_events(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl futures_core::Stream<Item = Result<sse::Event, Infallible>> + Send>, ApiError> {
    let last_id = headers
        .get(HEADER_LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<EventId>().ok());

    let filter = build_sse_filter(&query)?;
    let stream = event_sse_stream(state.events.clone(), last_id, filter);

    Ok(Sse::new(stream).keep_alive(sse::KeepAlive::new().interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS)).text("keep-alive")))
}

pub(crate) fn build_sse_filter(query: &SseQuery) -> Result<SseFilter, ApiError> {
    let mut filter = SseFilter::default();
    if let Some(events) = query.event.as_deref() {
        for value in events.split(',').map(str::trim).filter(|value| !value.is_empty()) {
            if !EVENT_KIND_WHITELIST.contains(&value) {
                return Err(ApiError::bad_request(format!("event filter '{value}' is not recognised")));
            }
            filter.event_kinds.insert(value.to_string());
        }
    }
    Ok(filter)
}

pub(crate) fn matches_sse_filter(envelope: &EventEnvelope, filter: &SseFilter) -> bool {
    filter.event_kinds.is_empty() || filter.event_kinds.contains(envelope.event.kind())
}

pub(crate) fn event_replay_stream(bus: EventBus, since: Option<EventId>) -> impl futures_core::Stream<Item = EventEnvelope> + Send {
    async_stream::stream! {
        let mut stream = bus.subscribe(since);
        while let Some(result) = stream.next().await {
            if let Ok(envelope) = result {
                yield envelope;
            }
        }
    }
}

pub(crate) fn event_sse_stream(
    bus: EventBus,
    since: Option<EventId>,
    filter: SseFilter,
) -> impl futures_core::Stream<Item = Result<sse::Event, Infallible>> + Send {
    let filter = Arc::new(filter);
    event_replay_stream(bus, since)
        .filter({
            let filter = Arc::clone(&filter);
            move |envelope| future::ready(matches_sse_filter(envelope, &filter))
        })
        .filter_map(|envelope| async move {
            match serde_json::to_string(&envelope.event) {
                Ok(payload) => Some(Ok(sse::Event::default().id(envelope.id.to_string()).event(envelope.event.kind()).data(payload))),
                Err(err) => {
                    error!(error = %err, "failed to serialise SSE event payload");
                    None
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_sse_filter_parses_known_kinds() {
        let query = SseQuery {
            event: Some("schema_reloaded,health_changed".to_string()),
        };
        let filter = build_sse_filter(&query).expect("filter builds");
        assert_eq!(filter.event_kinds.len(), 2);
    }

    #[test]
    fn build_sse_filter_rejects_unknown_kind() {
        let query = SseQuery {
            event: Some("bogus".to_string()),
        };
        assert!(build_sse_filter(&query).is_err());
    }

    #[test]
    fn matches_sse_filter_empty_filter_matches_everything() {
        let envelope = EventEnvelope {
            id: 1,
            timestamp: chrono::Utc::now(),
            event: Event::HealthChanged { degraded: Vec::new() },
        };
        assert!(matches_sse_filter(&envelope, &SseFilter::default()));
    }

    #[test]
    fn matches_sse_filter_respects_kind_allowlist() {
        let envelope = EventEnvelope {
            id: 1,
            timestamp: chrono::Utc::now(),
            event: Event::HealthChanged { degraded: Vec::new() },
        };
        let filter = SseFilter {
            event_kinds: std::iter::once("schema_reloaded".to_string()).collect(),
        };
        assert!(!matches_sse_filter(&envelope, &filter));
    }

    #[tokio::test]
    async fn sse_stream_emits_event_for_schema_reload() {
        let bus = EventBus::with_capacity(16);
        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = publisher.publish(Event::SchemaReloaded {
                catalog_version: 1,
                table_count: 3,
                function_count: 1,
            });
        });
        let stream = event_sse_stream(bus, None, SseFilter::default());
        futures_util::pin_mut!(stream);
        match tokio::time::timeout(Duration::from_millis(200), stream.next()).await.expect("timed out waiting for SSE event") {
            Some(Ok(_)) => {}
            other => panic!("expected SSE event, got {other:?}"),
        }
    }
}
