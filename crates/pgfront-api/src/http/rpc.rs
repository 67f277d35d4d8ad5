//! `POST /rpc/{name}` handlers: bind a JSON request body against a
//! catalog-described function and run it inside an RLS-scoped transaction.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pgfront_data::rpc::{build_call, decode_binary_column, flatten_composite};
use pgfront_data::RlsRepository;
use serde_json::Value as JsonValue;
use sqlx::Row;

use crate::app::state::ApiState;
use crate::http::auth::{extract_identity, AuthContext};
use crate::http::errors::ApiError;
use pgfront_api_models::RpcRequest;

const SCHEMA: &str = "public";

/// `POST /rpc/{name}` — call a public stored function with a JSON argument
/// object, matched by name with positional `argN` fallback.
///
/// # Errors
///
/// Returns [`ApiError::not_found`] if the function is unknown or not
/// public, or the binding/runtime errors documented on
/// [`pgfront_data::rpc::build_call`].
pub(crate) async fn call_function(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<RpcRequest>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let function = catalog
        .function(SCHEMA, &name)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("unknown function '{name}'")))?;

    let body = JsonValue::Object(request.arguments.into_iter().collect());
    let call = build_call(&function, &body)?;
    let returns_set = function.returns_set;

    let sql = call.sql;
    let params = call.params;
    let rows = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_all(&mut **tx, "rpc", &sql, &params).await }))
        .await?;

    state.telemetry.inc_event(&format!("rpc:{name}"));

    if returns_set {
        let values = rows
            .iter()
            .map(decode_set_row)
            .collect::<Result<Vec<_>, ApiError>>()?;
        Ok((StatusCode::OK, Json(JsonValue::Array(values))).into_response())
    } else {
        let Some(row) = rows.first() else {
            return Ok((StatusCode::OK, Json(JsonValue::Null)).into_response());
        };
        let result = decode_set_row(row)?;
        Ok((StatusCode::OK, Json(pgfront_api_models::RpcScalarResponse { result })).into_response())
    }
}

/// Decode a single result row from a `SELECT * FROM schema.fn(...)` call.
///
/// A function returning a scalar or composite type comes back as one
/// column; this decodes it as text first (falling back to bytes for
/// binary-returning functions) and lets [`flatten_composite`] parse any
/// JSON-looking payload into structured output.
fn decode_set_row(row: &sqlx::postgres::PgRow) -> Result<JsonValue, ApiError> {
    if row.columns().len() != 1 {
        let mut object = serde_json::Map::with_capacity(row.columns().len());
        for column in row.columns() {
            let name = column.name();
            let value: Option<String> = row
                .try_get(name)
                .map_err(|_| ApiError::internal("failed to decode RPC result column"))?;
            object.insert(
                name.to_string(),
                value.map_or(JsonValue::Null, |text| flatten_composite(&text)),
            );
        }
        return Ok(JsonValue::Object(object));
    }

    if let Ok(text) = row.try_get::<String, _>(0) {
        return Ok(flatten_composite(&text));
    }
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>(0) {
        return Ok(JsonValue::String(decode_binary_column(&bytes)));
    }
    if let Ok(value) = row.try_get::<JsonValue, _>(0) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<i64, _>(0) {
        return Ok(JsonValue::from(value));
    }
    if let Ok(value) = row.try_get::<f64, _>(0) {
        return Ok(JsonValue::from(value));
    }
    if let Ok(value) = row.try_get::<bool, _>(0) {
        return Ok(JsonValue::Bool(value));
    }
    Ok(JsonValue::Null)
}
