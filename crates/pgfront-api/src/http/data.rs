//! Dynamic `/{table}` REST CRUD handlers, synthesized at request time from
//! the live catalog rather than generated code.
//!
//! Every handler resolves a [`TableDescriptor`] from the current
//! [`SchemaCache`] snapshot, builds a parameterized statement via
//! [`pgfront_query`] (reads) or [`pgfront_data::crud`] (writes), and runs it
//! inside an [`RlsRepository::with_rls`] transaction scoped to the caller's
//! resolved [`Identity`].

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pgfront_config::SettingsFacade;
use pgfront_data::crud::{self, MissingPolicy, Resolution};
use pgfront_data::{Identity, RlsRepository};
use pgfront_introspect::{Catalog, TableDescriptor};
use pgfront_query::{CountMode, ParsedQuery, SqlValue};
use serde_json::Value as JsonValue;
use sqlx::Row;

use crate::app::state::ApiState;
use crate::http::auth::{extract_identity, AuthContext};
use crate::http::constants::{HEADER_AFFECTED_COUNT, HEADER_CONTENT_RANGE, HEADER_PREFER};
use crate::http::errors::ApiError;
use pgfront_api_models::{ContentRange, Preferences, ResolutionPreference, ReturnPreference};

const SCHEMA: &str = "public";

async fn resolve_max_limit(state: &ApiState) -> i64 {
    const FALLBACK_MAX_LIMIT: i64 = 1000;
    state
        .config
        .resolve("query.max_limit")
        .await
        .ok()
        .and_then(|setting| setting.value.as_i64())
        .unwrap_or(FALLBACK_MAX_LIMIT)
}

fn resolve_table(catalog: &Catalog, table_name: &str) -> Result<TableDescriptor, ApiError> {
    catalog
        .table(SCHEMA, table_name)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("unknown table '{table_name}'")))
}

fn preferences(headers: &HeaderMap) -> Preferences {
    headers
        .get(HEADER_PREFER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(Preferences::default, Preferences::parse)
}

fn to_crud_resolution(preference: Option<ResolutionPreference>) -> Resolution {
    match preference {
        Some(ResolutionPreference::MergeDuplicates) => Resolution::MergeDuplicates,
        Some(ResolutionPreference::IgnoreDuplicates) => Resolution::IgnoreDuplicates,
        None => Resolution::None,
    }
}

const fn to_crud_missing(missing_default: bool) -> MissingPolicy {
    if missing_default {
        MissingPolicy::NullFill
    } else {
        MissingPolicy::KeepExisting
    }
}

fn to_crud_return(preference: ReturnPreference) -> crud::ReturnPreference {
    match preference {
        ReturnPreference::Minimal => crud::ReturnPreference::Minimal,
        ReturnPreference::HeadersOnly => crud::ReturnPreference::HeadersOnly,
        ReturnPreference::Representation => crud::ReturnPreference::Representation,
    }
}

/// Parse the `on_conflict=` query parameter into an explicit conflict
/// target column list, without routing it through the filter translator
/// (which would otherwise treat it as a column filter).
fn on_conflict_columns(query: Option<&str>) -> Option<Vec<String>> {
    let query = query?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("on_conflict=")
            && !value.is_empty()
        {
            return Some(value.split(',').map(str::to_string).collect());
        }
    }
    None
}

fn parse_pk_values(table: &TableDescriptor, raw: &str) -> Result<Vec<(String, SqlValue)>, ApiError> {
    if table.primary_key.is_empty() {
        return Err(ApiError::not_found(format!(
            "table '{}' has no primary key",
            table.name
        )));
    }
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != table.primary_key.len() {
        return Err(ApiError::bad_request(
            "primary key value count does not match the table's primary key",
        ));
    }
    table
        .primary_key
        .iter()
        .zip(parts)
        .map(|(name, part)| {
            let column = table
                .column(name)
                .ok_or_else(|| ApiError::internal("primary key column missing from cached descriptor"))?;
            let (value, _) = crud::bind_json_value(column, &JsonValue::String(part.to_string()))?;
            Ok((name.clone(), value))
        })
        .collect()
}

fn representation_response(
    status: StatusCode,
    preference: ReturnPreference,
    rows: Vec<JsonValue>,
) -> Response {
    match preference {
        ReturnPreference::Minimal => (status, [(HEADER_AFFECTED_COUNT, rows.len().to_string())]).into_response(),
        ReturnPreference::HeadersOnly => (
            status,
            [
                (HEADER_CONTENT_RANGE, format!("*/{}", rows.len())),
                (HEADER_AFFECTED_COUNT, rows.len().to_string()),
            ],
        )
            .into_response(),
        ReturnPreference::Representation => (status, Json(JsonValue::Array(rows))).into_response(),
    }
}

/// Row count to report above the configured exact/estimated split, above
/// which a planner estimate is returned in place of an exact count.
const ESTIMATED_EXACT_THRESHOLD: i64 = 1000;

async fn exact_count(
    state: &ApiState,
    identity: &Identity,
    catalog: &Catalog,
    table_name: &str,
    parsed: &ParsedQuery,
) -> Result<Option<i64>, ApiError> {
    let filter = pgfront_query::translate_where(catalog, SCHEMA, table_name, parsed)?;
    let (where_clause, params) = filter.map_or_else(
        || (String::new(), Vec::new()),
        |translated| (format!(" WHERE {}", translated.sql), translated.params),
    );
    let sql = format!("SELECT count(*) AS count FROM \"{SCHEMA}\".\"{table_name}\"{where_clause}");

    let row = RlsRepository::new(&state.pool, identity.clone())
        .with_rls(move |tx| {
            Box::pin(async move { pgfront_data::fetch_optional(&mut **tx, "count", &sql, &params).await })
        })
        .await?;
    Ok(row.and_then(|row| row.try_get::<i64, _>("count").ok()))
}

/// Planner row estimate for the filtered relation, read back from
/// `EXPLAIN (FORMAT JSON)` rather than scanning the table.
async fn planned_count(
    state: &ApiState,
    identity: &Identity,
    catalog: &Catalog,
    table_name: &str,
    parsed: &ParsedQuery,
) -> Result<Option<i64>, ApiError> {
    let filter = pgfront_query::translate_where(catalog, SCHEMA, table_name, parsed)?;
    let (where_clause, params) = filter.map_or_else(
        || (String::new(), Vec::new()),
        |translated| (format!(" WHERE {}", translated.sql), translated.params),
    );
    let sql = format!("EXPLAIN (FORMAT JSON) SELECT 1 FROM \"{SCHEMA}\".\"{table_name}\"{where_clause}");

    let row = RlsRepository::new(&state.pool, identity.clone())
        .with_rls(move |tx| {
            Box::pin(async move { pgfront_data::fetch_optional(&mut **tx, "explain", &sql, &params).await })
        })
        .await?;

    Ok(row.and_then(|row| row.try_get::<JsonValue, _>("QUERY PLAN").ok()).and_then(|plan| {
        plan.as_array()?
            .first()?
            .get("Plan")?
            .get("Plan Rows")?
            .as_i64()
    }))
}

/// Resolve the `count=` total for a list request, dispatching to the mode
/// requested: `exact` always scans, `planned` always reads the planner
/// estimate, and `estimated` falls back to an exact scan only once the
/// planner estimate drops below [`ESTIMATED_EXACT_THRESHOLD`].
async fn resolve_count(
    state: &ApiState,
    identity: &Identity,
    catalog: &Catalog,
    table_name: &str,
    parsed: &ParsedQuery,
) -> Result<Option<i64>, ApiError> {
    match parsed.count {
        None => Ok(None),
        Some(CountMode::Exact) => exact_count(state, identity, catalog, table_name, parsed).await,
        Some(CountMode::Planned) => planned_count(state, identity, catalog, table_name, parsed).await,
        Some(CountMode::Estimated) => {
            match planned_count(state, identity, catalog, table_name, parsed).await? {
                Some(estimate) if estimate > ESTIMATED_EXACT_THRESHOLD => Ok(Some(estimate)),
                _ => exact_count(state, identity, catalog, table_name, parsed).await,
            }
        }
    }
}

fn content_range_header(offset: i64, returned: usize, total: Option<i64>) -> HeaderValue {
    let end = offset + i64::try_from(returned).unwrap_or(i64::MAX) - 1;
    let range = ContentRange { start: offset, end, total };
    HeaderValue::from_str(&range.to_header_value()).unwrap_or_else(|_| HeaderValue::from_static("*/*"))
}

/// `GET /{table}` — list rows matching the translated filter/order/limit.
///
/// # Errors
///
/// Returns an error if the table is unknown, the query string is malformed,
/// or the underlying query fails.
pub(crate) async fn list_rows(
    State(state): State<Arc<ApiState>>,
    Path(table_name): Path<String>,
    Extension(context): Extension<AuthContext>,
    uri: Uri,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let table = resolve_table(&catalog, &table_name)?;

    let parsed = pgfront_query::parse_query_string(uri.query().unwrap_or_default())?;
    let max_limit = resolve_max_limit(&state).await;
    let translated = pgfront_query::translate_select(&catalog, SCHEMA, &table_name, &parsed, max_limit)?;
    let offset = parsed.offset.unwrap_or(0);

    let count = resolve_count(&state, &identity, &catalog, &table_name, &parsed).await?;

    let sql = translated.sql;
    let params = translated.params;
    let columns = table.columns.clone();
    let rows = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_all(&mut **tx, "select", &sql, &params).await }))
        .await?;

    let body = pgfront_data::rows_to_json(&rows, &columns)?;
    state
        .telemetry
        .inc_query_rows_affected(&table_name, "select", u64::try_from(body.len()).unwrap_or(u64::MAX));

    let mut response = (StatusCode::OK, Json(JsonValue::Array(body.clone()))).into_response();
    if parsed.count.is_some() {
        response
            .headers_mut()
            .insert(HEADER_CONTENT_RANGE, content_range_header(offset, body.len(), count));
    }
    Ok(response)
}

/// `GET /{table}/{pk}` — fetch a single row by primary key.
///
/// # Errors
///
/// Returns [`ApiError::not_found`] if the table is unknown or no row
/// matches `pk`.
pub(crate) async fn get_row(
    State(state): State<Arc<ApiState>>,
    Path((table_name, pk)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let table = resolve_table(&catalog, &table_name)?;
    let pk_values = parse_pk_values(&table, &pk)?;

    let statement = crud::build_select_by_pk(&table, &pk_values);
    let sql = statement.sql;
    let params = statement.params;
    let columns = table.columns.clone();

    let row = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_optional(&mut **tx, "select_by_pk", &sql, &params).await }))
        .await?;

    let Some(row) = row else {
        return Err(ApiError::not_found(format!("no row matching '{pk}' in '{table_name}'")));
    };
    let body = pgfront_data::row_to_json(&row, &columns)?;
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// `POST /{table}` — single-object or batch insert/upsert.
///
/// # Errors
///
/// Returns an error if the table is unknown, a record names an unknown
/// column, or the conflict target is invalid.
pub(crate) async fn create_rows(
    State(state): State<Arc<ApiState>>,
    Path(table_name): Path<String>,
    Extension(context): Extension<AuthContext>,
    headers: HeaderMap,
    uri: Uri,
    Json(body): Json<JsonValue>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let table = resolve_table(&catalog, &table_name)?;
    let preferences = preferences(&headers);
    let on_conflict = on_conflict_columns(uri.query());

    let records: Vec<JsonValue> = match body {
        JsonValue::Array(records) => records,
        other => vec![other],
    };
    if records.is_empty() {
        return Err(ApiError::bad_request("insert body must contain at least one record"));
    }

    let statement = crud::build_batch_insert(
        &table,
        &records,
        on_conflict.as_deref(),
        to_crud_resolution(preferences.resolution),
        to_crud_missing(preferences.missing_default),
    )?;

    let sql = statement.sql;
    let params = statement.params;
    let columns = table.columns.clone();
    let rows = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_all(&mut **tx, "insert", &sql, &params).await }))
        .await?;

    let body = pgfront_data::rows_to_json(&rows, &columns)?;
    state
        .telemetry
        .inc_query_rows_affected(&table_name, "insert", u64::try_from(body.len()).unwrap_or(u64::MAX));

    Ok(representation_response(StatusCode::CREATED, preferences.return_kind, body))
}

async fn run_update_by_pk(
    state: &ApiState,
    identity: Identity,
    table: &TableDescriptor,
    table_name: &str,
    pk: &str,
    record: &JsonValue,
) -> Result<Vec<JsonValue>, ApiError> {
    let pk_values = parse_pk_values(table, pk)?;
    let statement = crud::build_update_by_pk(table, &pk_values, record)?;
    let sql = statement.sql;
    let params = statement.params;
    let columns = table.columns.clone();
    let rows = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_all(&mut **tx, "update", &sql, &params).await }))
        .await?;
    state
        .telemetry
        .inc_query_rows_affected(table_name, "update", u64::try_from(rows.len()).unwrap_or(u64::MAX));
    pgfront_data::rows_to_json(&rows, &columns).map_err(ApiError::from)
}

/// `PUT /{table}/{pk}` — full-row replace, addressed by primary key.
///
/// # Errors
///
/// Returns [`ApiError::not_found`] if no row matches `pk`, or the shared
/// update errors documented on [`update_row`].
pub(crate) async fn replace_row(
    state: State<Arc<ApiState>>,
    path: Path<(String, String)>,
    context: Extension<AuthContext>,
    headers: HeaderMap,
    body: Json<JsonValue>,
) -> Result<Response, ApiError> {
    update_row(state, path, context, headers, body).await
}

/// `PATCH /{table}/{pk}` — partial update, addressed by primary key.
///
/// # Errors
///
/// Returns [`ApiError::not_found`] if no row matches `pk`, or a record
/// naming an unknown column.
pub(crate) async fn update_row(
    State(state): State<Arc<ApiState>>,
    Path((table_name, pk)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
    headers: HeaderMap,
    Json(record): Json<JsonValue>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let table = resolve_table(&catalog, &table_name)?;
    let preferences = preferences(&headers);

    let body = run_update_by_pk(&state, identity, &table, &table_name, &pk, &record).await?;
    if body.is_empty() {
        return Err(ApiError::not_found(format!("no row matching '{pk}' in '{table_name}'")));
    }
    Ok(representation_response(StatusCode::OK, preferences.return_kind, body))
}

/// `DELETE /{table}/{pk}` — delete a single row by primary key.
///
/// # Errors
///
/// Returns [`ApiError::not_found`] if no row matches `pk`.
pub(crate) async fn delete_row(
    State(state): State<Arc<ApiState>>,
    Path((table_name, pk)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let table = resolve_table(&catalog, &table_name)?;
    let preferences = preferences(&headers);
    let pk_values = parse_pk_values(&table, &pk)?;

    let statement = crud::build_delete_by_pk(&table, &pk_values);
    let sql = statement.sql;
    let params = statement.params;
    let columns = table.columns.clone();
    let rows = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_all(&mut **tx, "delete", &sql, &params).await }))
        .await?;

    if rows.is_empty() {
        return Err(ApiError::not_found(format!("no row matching '{pk}' in '{table_name}'")));
    }
    state.telemetry.inc_query_rows_affected(&table_name, "delete", 1);
    let body = pgfront_data::rows_to_json(&rows, &columns)?;
    Ok(representation_response(StatusCode::OK, preferences.return_kind, body))
}

/// `PATCH /{table}` — batch update; requires at least one query-string
/// filter as a safety invariant.
///
/// # Errors
///
/// Returns [`ApiError::bad_request`] if the request carries no filter.
pub(crate) async fn batch_update(
    State(state): State<Arc<ApiState>>,
    Path(table_name): Path<String>,
    Extension(context): Extension<AuthContext>,
    headers: HeaderMap,
    uri: Uri,
    Json(record): Json<JsonValue>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let table = resolve_table(&catalog, &table_name)?;
    let preferences = preferences(&headers);

    let parsed = pgfront_query::parse_query_string(uri.query().unwrap_or_default())?;
    let filter = pgfront_query::translate_where(&catalog, SCHEMA, &table_name, &parsed)?;
    let crud_filter = filter.map(|translated| crud::Statement {
        sql: translated.sql,
        params: translated.params,
    });

    let statement = crud::build_batch_update(&table, &record, crud_filter.as_ref())?;
    let sql = statement.sql;
    let params = statement.params;
    let columns = table.columns.clone();
    let rows = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_all(&mut **tx, "batch_update", &sql, &params).await }))
        .await?;

    let body = pgfront_data::rows_to_json(&rows, &columns)?;
    state
        .telemetry
        .inc_query_rows_affected(&table_name, "batch_update", u64::try_from(body.len()).unwrap_or(u64::MAX));
    Ok(representation_response(StatusCode::OK, preferences.return_kind, body))
}

/// `DELETE /{table}` — batch delete; requires at least one query-string
/// filter as a safety invariant.
///
/// # Errors
///
/// Returns [`ApiError::bad_request`] if the request carries no filter.
pub(crate) async fn batch_delete(
    State(state): State<Arc<ApiState>>,
    Path(table_name): Path<String>,
    Extension(context): Extension<AuthContext>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let catalog = state.schema_cache.current();
    let table = resolve_table(&catalog, &table_name)?;
    let preferences = preferences(&headers);

    let parsed = pgfront_query::parse_query_string(uri.query().unwrap_or_default())?;
    let filter = pgfront_query::translate_where(&catalog, SCHEMA, &table_name, &parsed)?;
    let crud_filter = filter.map(|translated| crud::Statement {
        sql: translated.sql,
        params: translated.params,
    });

    let statement = crud::build_batch_delete(&table, crud_filter.as_ref())?;
    let sql = statement.sql;
    let params = statement.params;
    let columns = table.columns.clone();
    let rows = RlsRepository::new(&state.pool, identity)
        .with_rls(move |tx| Box::pin(async move { pgfront_data::fetch_all(&mut **tx, "batch_delete", &sql, &params).await }))
        .await?;

    let body = pgfront_data::rows_to_json(&rows, &columns)?;
    state
        .telemetry
        .inc_query_rows_affected(&table_name, "batch_delete", u64::try_from(body.len()).unwrap_or(u64::MAX));
    Ok(representation_response(StatusCode::OK, preferences.return_kind, body))
}
