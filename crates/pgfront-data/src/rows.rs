//! Dynamic row decoding: turns a `PgRow` produced by a
//! runtime-assembled statement back into a JSON object, keyed by the
//! catalog's column descriptors rather than a compile-time struct.
//!
//! This is the mirror image of [`crate::crud::bind_json_value`]: that module
//! converts request JSON into bound parameters using a column's declared
//! `pg_type`; this module converts a decoded row back into JSON using the
//! same type table.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use pgfront_introspect::ColumnDescriptor;
use serde_json::{Map, Value as JsonValue};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::error::{DataError, Result};

/// Decode a single row into a JSON object using `columns` to determine each
/// field's Postgres type.
///
/// A column absent from the row (can happen for a `RETURNING *` against a
/// table whose cached descriptor is momentarily stale) is skipped rather than
/// treated as an error, since a stale cache is resolved by the next schema
/// refresh, not by failing the in-flight request.
///
/// # Errors
///
/// Returns [`DataError::InvalidValue`] if a column's runtime value cannot be
/// decoded as its declared type.
pub fn row_to_json(row: &PgRow, columns: &[ColumnDescriptor]) -> Result<JsonValue> {
    let mut object = Map::with_capacity(columns.len());
    let present: Vec<&str> = row.columns().iter().map(|column| column.name()).collect();

    for column in columns {
        if !present.contains(&column.name.as_str()) {
            continue;
        }
        let value = decode_column(row, column)?;
        object.insert(column.name.clone(), value);
    }
    Ok(JsonValue::Object(object))
}

/// Decode every row in `rows` via [`row_to_json`].
///
/// # Errors
///
/// Propagates the first decode failure encountered.
pub fn rows_to_json(rows: &[PgRow], columns: &[ColumnDescriptor]) -> Result<Vec<JsonValue>> {
    rows.iter().map(|row| row_to_json(row, columns)).collect()
}

fn decode_column(row: &PgRow, column: &ColumnDescriptor) -> Result<JsonValue> {
    let invalid = |detail: &str| DataError::InvalidValue {
        column: column.name.clone(),
        detail: detail.to_string(),
    };
    let base_type = column.pg_type.trim_end_matches("[]");
    let name = column.name.as_str();

    if base_type != column.pg_type {
        // Array column: decode as JSON text via a best-effort cast. Exact
        // array element typing is left to the translator's filter support;
        // here we only need a JSON-safe round trip for response bodies.
        let text: Option<String> = row.try_get(name).map_err(|_| invalid("failed to decode array column"))?;
        return Ok(text.map_or(JsonValue::Null, |raw| {
            serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw))
        }));
    }

    match base_type {
        "boolean" | "bool" => decode_opt::<bool, _>(row, name, &invalid, JsonValue::Bool),
        "smallint" | "int2" => decode_opt::<i16, _>(row, name, &invalid, |v| JsonValue::from(v)),
        "integer" | "int4" | "serial" => decode_opt::<i32, _>(row, name, &invalid, JsonValue::from),
        "bigint" | "int8" | "bigserial" => decode_opt::<i64, _>(row, name, &invalid, JsonValue::from),
        "real" | "float4" => decode_opt::<f32, _>(row, name, &invalid, JsonValue::from),
        "double precision" | "float8" => decode_opt::<f64, _>(row, name, &invalid, JsonValue::from),
        "numeric" | "decimal" => decode_opt::<f64, _>(row, name, &invalid, JsonValue::from),
        "uuid" => decode_opt::<Uuid, _>(row, name, &invalid, |v| JsonValue::String(v.to_string())),
        "json" | "jsonb" => {
            let value: Option<JsonValue> = row.try_get(name).map_err(|_| invalid("failed to decode json"))?;
            Ok(value.unwrap_or(JsonValue::Null))
        }
        "bytea" => decode_opt::<Vec<u8>, _>(row, name, &invalid, |bytes| {
            JsonValue::String(format!("\\x{}", hex_encode(&bytes)))
        }),
        "timestamptz" | "timestamp with time zone" => {
            decode_opt::<DateTime<Utc>, _>(row, name, &invalid, |value| JsonValue::String(value.to_rfc3339()))
        }
        "timestamp" | "timestamp without time zone" => {
            decode_opt::<NaiveDateTime, _>(row, name, &invalid, |value| JsonValue::String(value.to_string()))
        }
        "date" => decode_opt::<NaiveDate, _>(row, name, &invalid, |value| JsonValue::String(value.to_string())),
        _ => decode_opt::<String, _>(row, name, &invalid, JsonValue::String),
    }
}

fn decode_opt<T, F>(
    row: &PgRow,
    name: &str,
    invalid: &dyn Fn(&str) -> DataError,
    wrap: F,
) -> Result<JsonValue>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: FnOnce(T) -> JsonValue,
{
    let value: Option<T> = row.try_get(name).map_err(|_| invalid("failed to decode column"))?;
    Ok(value.map_or(JsonValue::Null, wrap))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encode_round_trips_known_bytes() {
        assert_eq!(hex_encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }
}
