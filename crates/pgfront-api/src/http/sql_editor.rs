//! Admin SQL editor: runs caller-supplied statements sequentially against
//! the DDL-capable [`AdminPool`], bypassing RLS entirely.
//!
//! This endpoint is intentionally **not** part of the RLS-scoped data
//! plane — it is gated by API-key admin auth upstream in the router, the
//! same way the settings and setup endpoints are.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use pgfront_data::AdminPool;
use serde_json::{Map, Value as JsonValue};
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

use crate::app::state::ApiState;
use crate::http::errors::ApiError;
use pgfront_api_models::{SqlEditorRequest, SqlEditorResponse, SqlStatementResult};

/// Per-statement execution budget.
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// `POST /admin/sql` — split `statements` on `;` and run each in order.
///
/// # Errors
///
/// Returns [`ApiError::internal`] if any statement fails or exceeds its
/// timeout; statements already executed before the failure are not rolled
/// back, since each runs as its own top-level statement rather than inside
/// a shared transaction.
pub(crate) async fn run_statements(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SqlEditorRequest>,
) -> Result<Response, ApiError> {
    let pool = AdminPool::new(state.pool.clone());
    let mut results = Vec::new();

    for raw in request.statements.split(';') {
        let statement = raw.trim();
        if statement.is_empty() {
            continue;
        }
        let result = run_one(&pool, statement).await?;
        results.push(result);
    }

    Ok((StatusCode::OK, Json(SqlEditorResponse { results })).into_response())
}

async fn run_one(pool: &AdminPool, statement: &str) -> Result<SqlStatementResult, ApiError> {
    let rows = tokio::time::timeout(STATEMENT_TIMEOUT, sqlx::query(statement).fetch_all(pool.pool()))
        .await
        .map_err(|_| ApiError::internal(format!("statement timed out after {}s", STATEMENT_TIMEOUT.as_secs())))?
        .map_err(|source| ApiError::internal(format!("statement failed: {source}")))?;

    let decoded = rows.iter().map(decode_row).collect::<Result<Vec<_>, ApiError>>()?;
    Ok(SqlStatementResult {
        statement: statement.to_string(),
        rows_affected: decoded.len() as u64,
        rows: decoded
            .into_iter()
            .map(|value| match value {
                JsonValue::Object(map) => map.into_iter().collect(),
                _ => std::collections::HashMap::new(),
            })
            .collect(),
    })
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<JsonValue, ApiError> {
    let mut object = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let name = column.name();
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = decode_cell(row, name, &type_name)?;
        object.insert(name.to_string(), value);
    }
    Ok(JsonValue::Object(object))
}

fn decode_cell(row: &sqlx::postgres::PgRow, name: &str, type_name: &str) -> Result<JsonValue, ApiError> {
    let fail = || ApiError::internal(format!("failed to decode column '{name}' of type {type_name}"));
    match type_name {
        "BOOL" => Ok(row.try_get::<Option<bool>, _>(name).map_err(|_| fail())?.map_or(JsonValue::Null, JsonValue::Bool)),
        "INT2" => Ok(row.try_get::<Option<i16>, _>(name).map_err(|_| fail())?.map_or(JsonValue::Null, JsonValue::from)),
        "INT4" => Ok(row.try_get::<Option<i32>, _>(name).map_err(|_| fail())?.map_or(JsonValue::Null, JsonValue::from)),
        "INT8" => Ok(row.try_get::<Option<i64>, _>(name).map_err(|_| fail())?.map_or(JsonValue::Null, JsonValue::from)),
        "FLOAT4" => Ok(row.try_get::<Option<f32>, _>(name).map_err(|_| fail())?.map_or(JsonValue::Null, JsonValue::from)),
        "FLOAT8" | "NUMERIC" => Ok(row.try_get::<Option<f64>, _>(name).map_err(|_| fail())?.map_or(JsonValue::Null, JsonValue::from)),
        "UUID" => Ok(row
            .try_get::<Option<Uuid>, _>(name)
            .map_err(|_| fail())?
            .map_or(JsonValue::Null, |value| JsonValue::String(value.to_string()))),
        "JSON" | "JSONB" => Ok(row.try_get::<Option<JsonValue>, _>(name).map_err(|_| fail())?.unwrap_or(JsonValue::Null)),
        "TIMESTAMPTZ" => Ok(row
            .try_get::<Option<DateTime<Utc>>, _>(name)
            .map_err(|_| fail())?
            .map_or(JsonValue::Null, |value| JsonValue::String(value.to_rfc3339()))),
        "TIMESTAMP" => Ok(row
            .try_get::<Option<NaiveDateTime>, _>(name)
            .map_err(|_| fail())?
            .map_or(JsonValue::Null, |value| JsonValue::String(value.to_string()))),
        "DATE" => Ok(row
            .try_get::<Option<NaiveDate>, _>(name)
            .map_err(|_| fail())?
            .map_or(JsonValue::Null, |value| JsonValue::String(value.to_string()))),
        _ => Ok(row
            .try_get::<Option<String>, _>(name)
            .map_err(|_| fail())?
            .map_or(JsonValue::Null, JsonValue::String)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_statements_are_skipped() {
        let statements = "  ; \n ;select 1;  ";
        let parsed: Vec<&str> = statements.split(';').map(str::trim).filter(|s| !s.is_empty()).collect();
        assert_eq!(parsed, vec!["select 1"]);
    }
}
