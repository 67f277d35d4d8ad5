//! Runtime bridge between [`pgfront_query::SqlValue`] parameter lists and
//! `sqlx`'s bound-query execution, used by both the CRUD engine's emitted
//! [`crate::crud::Statement`]s and the RPC engine's [`crate::rpc::RpcCall`]s.

use pgfront_query::SqlValue;
use sqlx::Postgres;
use sqlx::postgres::{PgArguments, PgRow};

use crate::error::{DataError, Result};

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for value in params {
        query = match value.clone() {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(value) => query.bind(value),
            SqlValue::I64(value) => query.bind(value),
            SqlValue::F64(value) => query.bind(value),
            SqlValue::Text(value) => query.bind(value),
            SqlValue::Json(value) => query.bind(value),
            SqlValue::Uuid(value) => query.bind(value),
            SqlValue::Bytes(value) => query.bind(value),
        };
    }
    query
}

/// Run `sql` with `params` against `executor`, returning every produced row.
///
/// # Errors
///
/// Returns [`DataError::QueryFailed`] tagged with `operation` if the
/// statement fails.
pub async fn fetch_all<'e, E>(executor: E, operation: &'static str, sql: &str, params: &[SqlValue]) -> Result<Vec<PgRow>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    bind_all(sqlx::query(sql), params)
        .fetch_all(executor)
        .await
        .map_err(|source| DataError::QueryFailed { operation, source })
}

/// Run `sql` with `params` against `executor`, returning at most one row.
///
/// # Errors
///
/// Returns [`DataError::QueryFailed`] tagged with `operation` if the
/// statement fails.
pub async fn fetch_optional<'e, E>(
    executor: E,
    operation: &'static str,
    sql: &str,
    params: &[SqlValue],
) -> Result<Option<PgRow>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    bind_all(sqlx::query(sql), params)
        .fetch_optional(executor)
        .await
        .map_err(|source| DataError::QueryFailed { operation, source })
}
