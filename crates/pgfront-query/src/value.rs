//! Dynamic SQL value representation shared by the filter and emit stages.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Result, TranslatorError};

/// A single scalar value bound into an emitted SQL statement.
///
/// Every value reaching the database goes through this enum and is bound via
/// a placeholder (`$1`, `$2`, ...); nothing is ever interpolated into the SQL
/// text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integral Postgres type (`smallint`/`integer`/`bigint`/...).
    I64(i64),
    /// Any floating-point Postgres type (`real`/`double precision`/`numeric`).
    F64(f64),
    /// Text-like types (`text`/`varchar`/`char`/enum labels).
    Text(String),
    /// `json`/`jsonb`.
    Json(JsonValue),
    /// `uuid`.
    Uuid(Uuid),
    /// `bytea`, decoded from a `\x`-prefixed hex literal.
    Bytes(Vec<u8>),
}

/// Parse a raw query-string literal into a [`SqlValue`] appropriate for the
/// given Postgres type name, as reported by [`pgfront_introspect::ColumnDescriptor::pg_type`].
///
/// # Errors
///
/// Returns [`TranslatorError::InvalidValue`] if `raw` cannot be parsed into
/// the target type.
pub(crate) fn parse_scalar(column: &str, pg_type: &str, raw: &str) -> Result<SqlValue> {
    if raw.eq_ignore_ascii_case("null") {
        return Ok(SqlValue::Null);
    }

    let base_type = pg_type.trim_end_matches("[]");

    let invalid = |detail: &str| TranslatorError::InvalidValue {
        column: column.to_string(),
        detail: detail.to_string(),
    };

    match base_type {
        "boolean" | "bool" => match raw {
            "true" | "t" | "1" => Ok(SqlValue::Bool(true)),
            "false" | "f" | "0" => Ok(SqlValue::Bool(false)),
            _ => Err(invalid("expected a boolean literal")),
        },
        "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" | "serial" | "bigserial" => {
            raw.parse::<i64>().map(SqlValue::I64).map_err(|_| invalid("expected an integer"))
        }
        "real" | "double precision" | "numeric" | "float4" | "float8" | "decimal" => {
            raw.parse::<f64>().map(SqlValue::F64).map_err(|_| invalid("expected a number"))
        }
        "uuid" => Uuid::parse_str(raw).map(SqlValue::Uuid).map_err(|_| invalid("expected a UUID")),
        "json" | "jsonb" => {
            serde_json::from_str(raw).map(SqlValue::Json).map_err(|_| invalid("expected JSON"))
        }
        "bytea" => parse_bytea(raw).ok_or_else(|| invalid("expected a \\x-prefixed hex literal")),
        _ => Ok(SqlValue::Text(raw.to_string())),
    }
}

fn parse_bytea(raw: &str) -> Option<SqlValue> {
    let hex = raw.strip_prefix("\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let chars: Vec<char> = hex.chars().collect();
    for pair in chars.chunks(2) {
        let byte_str: String = pair.iter().collect();
        bytes.push(u8::from_str_radix(&byte_str, 16).ok()?);
    }
    Some(SqlValue::Bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_booleans_and_null() {
        assert_eq!(parse_scalar("c", "boolean", "true").unwrap(), SqlValue::Bool(true));
        assert_eq!(parse_scalar("c", "boolean", "f").unwrap(), SqlValue::Bool(false));
        assert_eq!(parse_scalar("c", "text", "null").unwrap(), SqlValue::Null);
    }

    #[test]
    fn parses_numbers() {
        assert_eq!(parse_scalar("c", "integer", "42").unwrap(), SqlValue::I64(42));
        assert_eq!(parse_scalar("c", "numeric", "3.5").unwrap(), SqlValue::F64(3.5));
    }

    #[test]
    fn rejects_malformed_integer() {
        assert!(parse_scalar("c", "integer", "not-a-number").is_err());
    }

    #[test]
    fn parses_uuid_and_rejects_garbage() {
        assert!(parse_scalar("c", "uuid", "00000000-0000-0000-0000-000000000000").is_ok());
        assert!(parse_scalar("c", "uuid", "'; DROP TABLE widgets; --").is_err());
    }

    #[test]
    fn falls_back_to_text_for_unknown_types() {
        assert_eq!(
            parse_scalar("c", "vector", "[1,2,3]").unwrap(),
            SqlValue::Text("[1,2,3]".into())
        );
    }

    #[test]
    fn parses_bytea_hex_literal() {
        assert_eq!(parse_scalar("c", "bytea", "\\xdeadbeef").unwrap(), SqlValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        assert!(parse_scalar("c", "bytea", "not-hex").is_err());
    }
}
