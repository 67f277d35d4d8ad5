//! Catalog introspection surface: the public, self-describing schema
//! document and an admin-triggered refresh.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pgfront_introspect::SchemaIntrospector;

use crate::app::state::ApiState;
use crate::http::errors::ApiError;
use pgfront_api_models::CatalogView;

/// `GET /.well-known/pgfront.json` — the current catalog, shaped for
/// client-side query-builder codegen.
pub(crate) async fn catalog_document(State(state): State<Arc<ApiState>>) -> Response {
    let catalog = state.schema_cache.current();
    let view = CatalogView::from(&*catalog);
    (StatusCode::OK, Json(view)).into_response()
}

/// `POST /admin/schema/refresh` — re-run introspection against the live
/// database and swap the cached catalog.
///
/// # Errors
///
/// Returns an error if introspection fails (e.g. the database is
/// unreachable or a system catalog query fails).
pub(crate) async fn refresh_schema(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let introspector = SchemaIntrospector::new(state.pool.clone(), state.schema_cache.clone(), state.events.clone());
    introspector
        .refresh()
        .await
        .map_err(|error| ApiError::internal(error.to_string()))?;
    state.telemetry.set_schema_cache_version(state.schema_cache.current().version);
    let view = CatalogView::from(&*state.schema_cache.current());
    Ok((StatusCode::OK, Json(view)).into_response())
}
