//! CRUD and batch upsert engine.
//!
//! Builds parameterized `INSERT`/`UPDATE`/`DELETE` statements from a JSON
//! request body and a [`TableDescriptor`], the way [`pgfront_query`] builds
//! `SELECT` statements from a query string. Every emitted statement appends
//! `RETURNING *` so the caller (the RLS wrapper) can count affected rows —
//! authorization failures surface as zero rows, never as a distinct error
//! path.

use std::fmt::Write as _;

use pgfront_introspect::{ColumnDescriptor, TableDescriptor};
use pgfront_query::SqlValue;
use serde_json::Value as JsonValue;

use crate::error::{DataError, Result};

/// Conflict-resolution strategy requested via the `Prefer: resolution=...`
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// No `ON CONFLICT` clause; a conflicting row is a unique-violation error.
    #[default]
    None,
    /// `ON CONFLICT (...) DO UPDATE SET ...`.
    MergeDuplicates,
    /// `ON CONFLICT (...) DO NOTHING`.
    IgnoreDuplicates,
}

/// `Prefer: missing=default` toggle: whether to null-fill columns absent
/// from an individual batch record's `DO UPDATE SET` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Columns absent from a record are left untouched on conflict.
    #[default]
    KeepExisting,
    /// Columns absent from a record are set to `NULL` on conflict.
    NullFill,
}

/// Response-shape preference requested via the `Prefer: return=...` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnPreference {
    /// No body; caller reports only an affected-row count.
    Minimal,
    /// No body; caller reports `Content-Range`/affected-row count.
    HeadersOnly,
    /// JSON body of the rows produced by `RETURNING *`.
    #[default]
    Representation,
}

/// An emitted statement and its bound parameters, ready for
/// `sqlx::query_with`.
#[derive(Debug, Clone)]
pub struct Statement {
    /// SQL text with `$1`, `$2`, ... placeholders.
    pub sql: String,
    /// Bind values, in placeholder order.
    pub params: Vec<SqlValue>,
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Determine whether a JSON value is a GeoJSON geometry object, and validate
/// it if so.
///
/// A value counts as GeoJSON when it is an object carrying a string `type`
/// key. Such an object must also carry `coordinates`; if it doesn't, the
/// value is rejected rather than silently treated as opaque JSON.
///
/// # Errors
///
/// Returns [`DataError::MalformedGeoJson`] if `type` is present without
/// `coordinates`.
pub fn is_geojson(column: &str, value: &JsonValue) -> Result<bool> {
    let Some(object) = value.as_object() else {
        return Ok(false);
    };
    let Some(type_value) = object.get("type") else {
        return Ok(false);
    };
    if !type_value.is_string() {
        return Ok(false);
    }
    if object.contains_key("coordinates") {
        Ok(true)
    } else {
        Err(DataError::MalformedGeoJson {
            column: column.to_string(),
        })
    }
}

/// Convert a JSON value from a request body into a bound [`SqlValue`] for
/// `column`, along with the SQL expression template the placeholder should
/// be substituted into (`"${}"` normally, `"ST_GeomFromGeoJSON(${})"` for a
/// detected GeoJSON geometry).
///
/// # Errors
///
/// Returns [`DataError::InvalidValue`] if the JSON shape doesn't match the
/// column's declared type, or [`DataError::MalformedGeoJson`] per
/// [`is_geojson`].
pub fn bind_json_value(column: &ColumnDescriptor, value: &JsonValue) -> Result<(SqlValue, &'static str)> {
    if is_geojson(&column.name, value)? {
        let text = value.to_string();
        return Ok((SqlValue::Text(text), "ST_GeomFromGeoJSON(${})"));
    }

    let sql_value = json_to_sql_value(column, value)?;
    Ok((sql_value, "${}"))
}

fn json_to_sql_value(column: &ColumnDescriptor, value: &JsonValue) -> Result<SqlValue> {
    let invalid = |detail: &str| DataError::InvalidValue {
        column: column.name.clone(),
        detail: detail.to_string(),
    };

    match value {
        JsonValue::Null => Ok(SqlValue::Null),
        JsonValue::Bool(flag) => Ok(SqlValue::Bool(*flag)),
        JsonValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                Ok(SqlValue::I64(int))
            } else if let Some(float) = number.as_f64() {
                Ok(SqlValue::F64(float))
            } else {
                Err(invalid("number out of range"))
            }
        }
        JsonValue::String(text) => match column.pg_type.as_str() {
            "uuid" => uuid::Uuid::parse_str(text)
                .map(SqlValue::Uuid)
                .map_err(|_| invalid("expected a UUID")),
            "bytea" => text
                .strip_prefix("\\x")
                .and_then(decode_hex)
                .map(SqlValue::Bytes)
                .ok_or_else(|| invalid("expected a \\x-prefixed hex literal")),
            _ => Ok(SqlValue::Text(text.clone())),
        },
        JsonValue::Array(_) | JsonValue::Object(_) => Ok(SqlValue::Json(value.clone())),
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let chars: Vec<char> = hex.chars().collect();
    chars
        .chunks(2)
        .map(|pair| u8::from_str_radix(&pair.iter().collect::<String>(), 16).ok())
        .collect()
}

fn require_column<'a>(table: &'a TableDescriptor, name: &str) -> Result<&'a ColumnDescriptor> {
    table
        .column(name)
        .ok_or_else(|| DataError::UnknownColumn { column: name.to_string() })
}

/// Resolve the conflict target for a batch upsert: either the explicit
/// `on_conflict=` override, or the table's primary key if it has one.
///
/// # Errors
///
/// Returns [`DataError::ConflictTargetMissing`] if no override is given and
/// the table has no primary key, or [`DataError::UnknownColumn`] if an
/// override names a column the table doesn't have.
pub fn resolve_conflict_target<'a>(
    table: &'a TableDescriptor,
    on_conflict: Option<&'a [String]>,
) -> Result<&'a [String]> {
    if let Some(columns) = on_conflict {
        for column in columns {
            require_column(table, column)?;
        }
        return Ok(columns);
    }
    if table.primary_key.is_empty() {
        return Err(DataError::ConflictTargetMissing {
            table: table.qualified_name(),
        });
    }
    Ok(&table.primary_key)
}

/// Build a single-row `INSERT ... RETURNING *` for `POST /T` (single object
/// body, or `PUT`/single-row upsert semantics without conflict handling).
///
/// # Errors
///
/// Returns an error if a key in `record` is not a column of `table`, or a
/// value fails to convert.
pub fn build_insert(table: &TableDescriptor, record: &JsonValue) -> Result<Statement> {
    build_batch_insert(table, std::slice::from_ref(record), None, Resolution::None, MissingPolicy::KeepExisting)
}

/// Build a batch `INSERT ... VALUES (...), (...) ON CONFLICT ...
/// RETURNING *` statement for `POST /T` with an array body.
///
/// The column set is taken from the first record; later records missing a
/// column bind `NULL` for it, matching the batch-upsert contract.
///
/// # Errors
///
/// Returns [`DataError::ConflictTargetMissing`] when `resolution` requires a
/// conflict target the table cannot provide, or the per-value/column errors
/// documented on [`bind_json_value`]/[`resolve_conflict_target`].
pub fn build_batch_insert(
    table: &TableDescriptor,
    records: &[JsonValue],
    on_conflict: Option<&[String]>,
    resolution: Resolution,
    missing: MissingPolicy,
) -> Result<Statement> {
    let columns: Vec<&str> = records
        .first()
        .and_then(JsonValue::as_object)
        .map(|object| object.keys().map(String::as_str).collect())
        .unwrap_or_default();

    let column_descriptors: Vec<&ColumnDescriptor> =
        columns.iter().map(|name| require_column(table, name)).collect::<Result<_>>()?;

    let mut params = Vec::new();
    let mut row_groups = Vec::with_capacity(records.len());

    for record in records {
        let object = record.as_object();
        let mut placeholders = Vec::with_capacity(columns.len());
        for column in &column_descriptors {
            let value = object.and_then(|object| object.get(&column.name)).unwrap_or(&JsonValue::Null);
            let (sql_value, template) = bind_json_value(column, value)?;
            params.push(sql_value);
            placeholders.push(template.replace("{}", &params.len().to_string()));
        }
        row_groups.push(format!("({})", placeholders.join(", ")));
    }

    let column_list = columns.iter().map(|name| quote_ident(name)).collect::<Vec<_>>().join(", ");
    let mut sql = format!(
        "INSERT INTO {}.{} ({column_list}) VALUES {}",
        quote_ident(&table.schema),
        quote_ident(&table.name),
        row_groups.join(", ")
    );

    match resolution {
        Resolution::None => {}
        Resolution::IgnoreDuplicates => {
            let target = resolve_conflict_target(table, on_conflict)?;
            let target_list = target.iter().map(|name| quote_ident(name)).collect::<Vec<_>>().join(", ");
            write!(sql, " ON CONFLICT ({target_list}) DO NOTHING").expect("String write is infallible");
        }
        Resolution::MergeDuplicates => {
            let target = resolve_conflict_target(table, on_conflict)?;
            let target_list = target.iter().map(|name| quote_ident(name)).collect::<Vec<_>>().join(", ");
            let update_columns: Vec<&str> = columns.iter().copied().filter(|name| !target.iter().any(|t| t == name)).collect();
            let assignments = update_columns
                .iter()
                .map(|name| match missing {
                    MissingPolicy::NullFill => format!("{} = EXCLUDED.{}", quote_ident(name), quote_ident(name)),
                    MissingPolicy::KeepExisting => format!(
                        "{} = COALESCE(EXCLUDED.{}, {}.{})",
                        quote_ident(name),
                        quote_ident(name),
                        quote_ident(&table.name),
                        quote_ident(name)
                    ),
                })
                .collect::<Vec<_>>()
                .join(", ");
            if assignments.is_empty() {
                write!(sql, " ON CONFLICT ({target_list}) DO NOTHING").expect("String write is infallible");
            } else {
                write!(sql, " ON CONFLICT ({target_list}) DO UPDATE SET {assignments}").expect("String write is infallible");
            }
        }
    }

    sql.push_str(" RETURNING *");
    Ok(Statement { sql, params })
}

/// Build a single-row `UPDATE ... WHERE <pk> RETURNING *` for
/// `PUT`/`PATCH /T/:pk`.
///
/// # Errors
///
/// Returns an error if `record` names an unknown column or a value fails to
/// convert.
pub fn build_update_by_pk(table: &TableDescriptor, pk_values: &[(String, SqlValue)], record: &JsonValue) -> Result<Statement> {
    let object = record.as_object().cloned().unwrap_or_default();
    let mut params = Vec::new();
    let mut assignments = Vec::with_capacity(object.len());

    for (name, value) in &object {
        let column = require_column(table, name)?;
        let (sql_value, template) = bind_json_value(column, value)?;
        params.push(sql_value);
        let placeholder = template.replace("{}", &params.len().to_string());
        assignments.push(format!("{} = {placeholder}", quote_ident(name)));
    }

    let mut sql = format!("UPDATE {}.{} SET {}", quote_ident(&table.schema), quote_ident(&table.name), assignments.join(", "));
    append_pk_predicate(&mut sql, pk_values, &mut params);
    sql.push_str(" RETURNING *");
    Ok(Statement { sql, params })
}

/// Build a single-row `DELETE ... WHERE <pk> RETURNING *` for
/// `DELETE /T/:pk`.
#[must_use]
pub fn build_delete_by_pk(table: &TableDescriptor, pk_values: &[(String, SqlValue)]) -> Statement {
    let mut sql = format!("DELETE FROM {}.{}", quote_ident(&table.schema), quote_ident(&table.name));
    let mut params = Vec::new();
    append_pk_predicate(&mut sql, pk_values, &mut params);
    sql.push_str(" RETURNING *");
    Statement { sql, params }
}

/// Build a single-row `SELECT * ... WHERE <pk>` for `GET /T/:pk`.
#[must_use]
pub fn build_select_by_pk(table: &TableDescriptor, pk_values: &[(String, SqlValue)]) -> Statement {
    let mut sql = format!("SELECT * FROM {}.{}", quote_ident(&table.schema), quote_ident(&table.name));
    let mut params = Vec::new();
    append_pk_predicate(&mut sql, pk_values, &mut params);
    Statement { sql, params }
}

fn append_pk_predicate(sql: &mut String, pk_values: &[(String, SqlValue)], params: &mut Vec<SqlValue>) {
    sql.push_str(" WHERE ");
    let predicate = pk_values
        .iter()
        .map(|(name, value)| {
            params.push(value.clone());
            format!("{} = ${}", quote_ident(name), params.len())
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    sql.push_str(&predicate);
}

/// Build a batch `UPDATE ... WHERE <filter> RETURNING *` for `PATCH /T`.
/// Batch writes without a filter are a safety violation, not an empty
/// no-op, so this refuses to build a statement in that case.
///
/// # Errors
///
/// Returns [`DataError::MissingBatchFilter`] if `filter` is `None`.
pub fn build_batch_update(
    table: &TableDescriptor,
    record: &JsonValue,
    filter: Option<&Statement>,
) -> Result<Statement> {
    let Some(filter) = filter else {
        return Err(DataError::MissingBatchFilter {
            table: table.qualified_name(),
            operation: "update",
        });
    };

    let object = record.as_object().cloned().unwrap_or_default();
    let mut params = Vec::new();
    let mut assignments = Vec::with_capacity(object.len());
    for (name, value) in &object {
        let column = require_column(table, name)?;
        let (sql_value, template) = bind_json_value(column, value)?;
        params.push(sql_value);
        let placeholder = template.replace("{}", &params.len().to_string());
        assignments.push(format!("{} = {placeholder}", quote_ident(name)));
    }

    let offset = params.len();
    let shifted_where = reindex_placeholders(&filter.sql, offset);
    params.extend(filter.params.iter().cloned());

    let sql = format!(
        "UPDATE {}.{} SET {} WHERE {shifted_where} RETURNING *",
        quote_ident(&table.schema),
        quote_ident(&table.name),
        assignments.join(", ")
    );
    Ok(Statement { sql, params })
}

/// Build a batch `DELETE ... WHERE <filter> RETURNING *` for `DELETE /T`.
///
/// # Errors
///
/// Returns [`DataError::MissingBatchFilter`] if `filter` is `None`.
pub fn build_batch_delete(table: &TableDescriptor, filter: Option<&Statement>) -> Result<Statement> {
    let Some(filter) = filter else {
        return Err(DataError::MissingBatchFilter {
            table: table.qualified_name(),
            operation: "delete",
        });
    };
    let sql = format!(
        "DELETE FROM {}.{} WHERE {} RETURNING *",
        quote_ident(&table.schema),
        quote_ident(&table.name),
        filter.sql
    );
    Ok(Statement {
        sql,
        params: filter.params.clone(),
    })
}

/// Shift every `$n` placeholder in `sql` up by `offset`, used to splice a
/// filter's `WHERE` fragment (numbered from `$1`) after the `SET` clause's
/// own placeholders.
fn reindex_placeholders(sql: &str, offset: usize) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if ch == '$' {
            let mut digits = String::new();
            while let Some((_, next)) = chars.peek() {
                if next.is_ascii_digit() {
                    digits.push(*next);
                    chars.next();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                result.push('$');
            } else {
                let n: usize = digits.parse().expect("digits are ascii numeric");
                write!(result, "${}", n + offset).expect("String write is infallible");
            }
        } else {
            result.push(ch);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfront_introspect::ColumnDescriptor;
    use serde_json::json;

    fn widgets_table() -> TableDescriptor {
        TableDescriptor {
            schema: "public".into(),
            name: "widgets".into(),
            columns: vec![
                ColumnDescriptor {
                    name: "id".into(),
                    position: 1,
                    pg_type: "uuid".into(),
                    nullable: false,
                    has_default: true,
                    is_generated: false,
                },
                ColumnDescriptor {
                    name: "name".into(),
                    position: 2,
                    pg_type: "text".into(),
                    nullable: true,
                    has_default: false,
                    is_generated: false,
                },
                ColumnDescriptor {
                    name: "location".into(),
                    position: 3,
                    pg_type: "geography".into(),
                    nullable: true,
                    has_default: false,
                    is_generated: false,
                },
            ],
            primary_key: vec!["id".into()],
            foreign_keys: vec![],
            is_view: false,
            rls_enabled: true,
        }
    }

    #[test]
    fn detects_geojson_point() {
        let point = json!({"type": "Point", "coordinates": [1.0, 2.0]});
        assert!(is_geojson("location", &point).unwrap());
    }

    #[test]
    fn rejects_geojson_missing_coordinates() {
        let malformed = json!({"type": "Point"});
        assert!(matches!(
            is_geojson("location", &malformed),
            Err(DataError::MalformedGeoJson { .. })
        ));
    }

    #[test]
    fn plain_object_is_not_geojson() {
        let plain = json!({"foo": "bar"});
        assert!(!is_geojson("name", &plain).unwrap());
    }

    #[test]
    fn builds_single_insert_with_returning() {
        let table = widgets_table();
        let stmt = build_insert(&table, &json!({"name": "widget"})).unwrap();
        assert!(stmt.sql.contains("INSERT INTO \"public\".\"widgets\""));
        assert!(stmt.sql.ends_with("RETURNING *"));
        assert_eq!(stmt.params, vec![SqlValue::Text("widget".into())]);
    }

    #[test]
    fn batch_insert_null_fills_missing_columns_from_first_record() {
        let table = widgets_table();
        let records = vec![json!({"name": "a"}), json!({"name": "b"})];
        let stmt = build_batch_insert(&table, &records, None, Resolution::None, MissingPolicy::KeepExisting).unwrap();
        assert_eq!(stmt.params.len(), 2);
        assert!(stmt.sql.contains("VALUES ($1), ($2)"));
    }

    #[test]
    fn merge_duplicates_uses_primary_key_as_default_conflict_target() {
        let table = widgets_table();
        let records = vec![json!({"id": "00000000-0000-0000-0000-000000000000", "name": "a"})];
        let stmt =
            build_batch_insert(&table, &records, None, Resolution::MergeDuplicates, MissingPolicy::NullFill).unwrap();
        assert!(stmt.sql.contains("ON CONFLICT (\"id\") DO UPDATE SET"));
        assert!(stmt.sql.contains("\"name\" = EXCLUDED.\"name\""));
    }

    #[test]
    fn upsert_without_primary_key_is_rejected() {
        let mut table = widgets_table();
        table.primary_key.clear();
        assert!(matches!(
            resolve_conflict_target(&table, None),
            Err(DataError::ConflictTargetMissing { .. })
        ));
    }

    #[test]
    fn batch_update_without_filter_is_rejected() {
        let table = widgets_table();
        assert!(matches!(
            build_batch_update(&table, &json!({"name": "x"}), None),
            Err(DataError::MissingBatchFilter { operation: "update", .. })
        ));
    }

    #[test]
    fn batch_update_reindexes_filter_placeholders_after_set_clause() {
        let table = widgets_table();
        let filter = Statement {
            sql: "\"name\" = $1".to_string(),
            params: vec![SqlValue::Text("old".into())],
        };
        let stmt = build_batch_update(&table, &json!({"name": "new"}), Some(&filter)).unwrap();
        assert!(stmt.sql.contains("SET \"name\" = $1 WHERE \"name\" = $2"));
        assert_eq!(stmt.params, vec![SqlValue::Text("new".into()), SqlValue::Text("old".into())]);
    }

    #[test]
    fn geojson_field_is_wrapped_in_st_geomfromgeojson() {
        let table = widgets_table();
        let point = json!({"type": "Point", "coordinates": [1.0, 2.0]});
        let stmt = build_insert(&table, &json!({"location": point})).unwrap();
        assert!(stmt.sql.contains("ST_GeomFromGeoJSON($1)"));
    }

    #[test]
    fn select_by_pk_has_no_returning_clause() {
        let table = widgets_table();
        let pk = vec![("id".to_string(), SqlValue::Text("a".into()))];
        let stmt = build_select_by_pk(&table, &pk);
        assert_eq!(stmt.sql, "SELECT * FROM \"public\".\"widgets\" WHERE \"id\" = $1");
        assert!(!stmt.sql.contains("RETURNING"));
    }
}
