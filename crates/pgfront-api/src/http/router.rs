//! Router construction and server host for the API.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::{header::CONTENT_TYPE, HeaderName, Method, Request};
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use pgfront_config::ConfigService;
use pgfront_events::EventBus;
use pgfront_introspect::SchemaCache;
use pgfront_storage::StorageService;
use pgfront_telemetry::{build_sha, Metrics};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::app::state::ApiState;
use crate::config::SharedConfig;
use crate::http::auth::{require_api_key, require_setup_token, resolve_identity};
use crate::http::constants::{HEADER_API_KEY, HEADER_API_KEY_LEGACY, HEADER_LAST_EVENT_ID, HEADER_REQUEST_ID, HEADER_SETUP_TOKEN};
use crate::http::data::{batch_delete, batch_update, create_rows, delete_row, get_row, list_rows, replace_row, update_row};
use crate::http::docs::openapi_document_handler;
use crate::http::health::{health, health_full, metrics};
use crate::http::logs::stream_logs;
use crate::http::rpc::call_function;
use crate::http::schema::{catalog_document, refresh_schema};
use crate::http::settings::{get_secret_metadata, get_setting, list_settings, patch_settings};
use crate::http::setup::{setup_complete, setup_start};
use crate::http::sql_editor::run_statements;
use crate::http::sse::stream_events;
use crate::http::storage::{
    abort_upload, chunked_status, complete_upload, create_bucket, delete_bucket, delete_object, download_signed, get_object, head_object,
    init_upload, list_buckets, put_bucket, put_object, sign_object, upload_chunk,
};
use crate::http::telemetry::HttpMetricsLayer;
use crate::openapi::OpenApiDependencies;

/// Axum router wrapper that hosts the pgfront API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Construct a new API server with shared dependencies wired through application state.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the `OpenAPI` document fails.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConfigService,
        pool: PgPool,
        schema_cache: SchemaCache,
        storage: StorageService,
        events: EventBus,
        telemetry: Metrics,
        jwt_secret: Vec<u8>,
    ) -> Result<Self> {
        let openapi = OpenApiDependencies::embedded_at(Path::new("docs/api/openapi.json"));
        Self::with_config(Arc::new(config), pool, schema_cache, storage, events, telemetry, jwt_secret, &openapi)
    }

    #[allow(clippy::too_many_arguments)]
    fn with_config(
        config: SharedConfig,
        pool: PgPool,
        schema_cache: SchemaCache,
        storage: StorageService,
        events: EventBus,
        telemetry: Metrics,
        jwt_secret: Vec<u8>,
        openapi: &OpenApiDependencies,
    ) -> Result<Self> {
        (openapi.persist)(&openapi.path, &openapi.document)?;
        let state = Self::build_state(config, pool, schema_cache, storage, telemetry.clone(), Arc::clone(&openapi.document), events, jwt_secret);

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::DELETE, Method::HEAD, Method::OPTIONS])
            .allow_headers([
                CONTENT_TYPE,
                HeaderName::from_static(HEADER_API_KEY),
                HeaderName::from_static(HEADER_API_KEY_LEGACY),
                HeaderName::from_static(HEADER_SETUP_TOKEN),
                HeaderName::from_static(HEADER_LAST_EVENT_ID),
            ]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let method = request.method().clone();
                let uri_path = request.uri().path();
                let request_id = request.headers().get(HEADER_REQUEST_ID).and_then(|value| value.to_str().ok()).unwrap_or("").to_string();

                tracing::info_span!(
                    "http.request",
                    method = %method,
                    route = %uri_path,
                    request_id = %request_id,
                    mode = tracing::field::Empty,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(|response: &axum::response::Response, latency: Duration, span: &Span| {
                span.record("status_code", response.status().as_u16());
                span.record("latency_ms", u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
            });
        let layered = ServiceBuilder::new()
            .layer(pgfront_telemetry::propagate_request_id_layer())
            .layer(pgfront_telemetry::set_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Self::build_router(&state).layer(cors_layer).route_layer(layered).with_state(state);

        Ok(Self { router })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build_state(
        config: SharedConfig,
        pool: PgPool,
        schema_cache: SchemaCache,
        storage: StorageService,
        telemetry: Metrics,
        openapi_document: Arc<serde_json::Value>,
        events: EventBus,
        jwt_secret: Vec<u8>,
    ) -> Arc<ApiState> {
        Arc::new(ApiState::new(config, pool, schema_cache, storage, telemetry, openapi_document, events, jwt_secret))
    }

    fn build_router(state: &Arc<ApiState>) -> Router<Arc<ApiState>> {
        Self::public_routes().merge(Self::admin_routes(state)).merge(Self::data_routes(state))
    }

    fn public_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/health", get(health))
            .route("/health/full", get(health_full))
            .route("/.well-known/pgfront.json", get(catalog_document))
            .route("/metrics", get(metrics))
            .route("/docs/openapi.json", get(openapi_document_handler))
            .route("/storage/object", get(download_signed))
    }

    fn admin_routes(state: &Arc<ApiState>) -> Router<Arc<ApiState>> {
        let require_setup = middleware::from_fn_with_state(state.clone(), require_setup_token);
        let require_api = middleware::from_fn_with_state(state.clone(), require_api_key);

        Router::new()
            .route("/admin/setup/start", post(setup_start))
            .route("/admin/setup/complete", post(setup_complete).route_layer(require_setup))
            .route("/admin/settings", get(list_settings).patch(patch_settings).route_layer(require_api.clone()))
            .route("/admin/settings/{key}", get(get_setting).route_layer(require_api.clone()))
            .route("/admin/secrets/{key}", get(get_secret_metadata).route_layer(require_api.clone()))
            .route("/admin/schema/refresh", post(refresh_schema).route_layer(require_api.clone()))
            .route("/admin/sql", post(run_statements).route_layer(require_api.clone()))
            .route("/admin/events", get(stream_events).route_layer(require_api.clone()))
            .route("/admin/logs", get(stream_logs).route_layer(require_api))
    }

    fn data_routes(state: &Arc<ApiState>) -> Router<Arc<ApiState>> {
        let resolve_user = middleware::from_fn_with_state(state.clone(), resolve_identity);

        Router::new()
            .route("/{table}", get(list_rows).post(create_rows).patch(batch_update).delete(batch_delete))
            .route("/{table}/{pk}", get(get_row).put(replace_row).patch(update_row).delete(delete_row))
            .route("/rpc/{name}", post(call_function))
            .route("/storage/buckets", get(list_buckets).post(create_bucket))
            .route("/storage/buckets/{bucket}", put(put_bucket).delete(delete_bucket))
            .route("/storage/sign/{bucket}/{*path}", post(sign_object))
            .route(
                "/storage/{bucket}/{*path}",
                get(get_object).head(head_object).put(put_object).delete(delete_object),
            )
            .route("/storage/{bucket}/chunked", post(init_upload))
            .route("/storage/{bucket}/chunked/{session_id}", get(chunked_status).delete(abort_upload))
            .route("/storage/{bucket}/chunked/{session_id}/{index}", put(upload_chunk))
            .route("/storage/{bucket}/chunked/{session_id}/complete", post(complete_upload))
            .route_layer(resolve_user)
    }

    /// Serve the API using the configured router on the supplied address.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        tracing::info!("Starting API on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>()).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn router(&self) -> &Router {
        &self.router
    }
}
