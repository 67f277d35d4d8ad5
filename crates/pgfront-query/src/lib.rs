#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Translates a PostgREST-style query string into parameterized SQL against
//! a live [`pgfront_introspect::Catalog`].
//!
//! Parsing and emission are split into private submodules so each grammar
//! production (`tokenize`, `filter`, `order`, `select`) can be unit-tested
//! in isolation from SQL generation (`emit`). Every value bound into the
//! emitted statement passes through [`SqlValue`] and a numbered
//! placeholder; request input never reaches the SQL text itself.

mod emit;
pub mod error;
mod filter;
mod order;
mod select;
mod tokenize;
mod value;

use std::fmt::Write as _;

use pgfront_introspect::Catalog;

pub use error::{Result, TranslatorError};
pub use filter::{Condition, Node, Operator, RawValue};
pub use order::{Direction, Nulls, OrderTerm, VectorMetric};
pub use select::SelectItem;
pub use value::SqlValue;

use emit::Emitter;

/// Row-count reporting mode requested via `count=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// `COUNT(*)` over the full filtered result set.
    Exact,
    /// Planner row estimate (`EXPLAIN`), cheaper but approximate.
    Planned,
    /// Exact below a threshold, planner estimate above it.
    Estimated,
}

impl CountMode {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "exact" => Ok(Self::Exact),
            "planned" => Ok(Self::Planned),
            "estimated" => Ok(Self::Estimated),
            other => Err(TranslatorError::InvalidValue {
                column: "count".to_string(),
                detail: format!("unrecognized count mode `{other}`"),
            }),
        }
    }
}

/// A fully parsed PostgREST-style query string, not yet bound to any
/// particular relation.
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    /// Combined `WHERE` predicate built from per-column filters and any
    /// `and=`/`or=` groups, implicitly ANDed together.
    pub filter: Option<Node>,
    /// `order=` terms, applied in the order given.
    pub order: Vec<OrderTerm>,
    /// `select=` projection tree. Empty means `*`.
    pub select: Vec<SelectItem>,
    /// `limit=` row cap.
    pub limit: Option<i64>,
    /// `offset=` row skip.
    pub offset: Option<i64>,
    /// `count=` reporting mode, if requested via the `Prefer` header surface.
    pub count: Option<CountMode>,
}

const RESERVED_KEYS: &[&str] = &["select", "order", "limit", "offset", "count", "and", "or"];

/// Parse a raw (already percent-decoded by the HTTP layer, or not — both
/// work since this uses `url::form_urlencoded`) query string into a
/// [`ParsedQuery`].
///
/// Multiple occurrences of the same column key are implicitly ANDed, e.g.
/// `age=gte.18&age=lte.30`.
///
/// # Errors
///
/// Returns a [`TranslatorError`] for any malformed filter, order, select, or
/// reserved-parameter value.
pub fn parse_query_string(raw_query: &str) -> Result<ParsedQuery> {
    let trimmed = raw_query.trim_start_matches('?');
    let mut filters = Vec::new();
    let mut parsed = ParsedQuery::default();

    for (key, value) in url::form_urlencoded::parse(trimmed.as_bytes()) {
        match key.as_ref() {
            "select" => parsed.select = select::parse_select(&value)?,
            "order" => parsed.order = order::parse_order(&value)?,
            "limit" => parsed.limit = Some(parse_i64_param("limit", &value)?),
            "offset" => parsed.offset = Some(parse_i64_param("offset", &value)?),
            "count" => parsed.count = Some(CountMode::parse(&value)?),
            "and" => filters.push(filter::parse_group(&value, false)?),
            "or" => filters.push(filter::parse_group(&value, true)?),
            column if !RESERVED_KEYS.contains(&column) => {
                let (negated, operator, raw_value) = filter::parse_op_value(&value)?;
                filters.push(Node::Leaf(Condition {
                    column: column.to_string(),
                    negated,
                    operator,
                    value: raw_value,
                }));
            }
            _ => {}
        }
    }

    parsed.filter = match filters.len() {
        0 => None,
        1 => filters.into_iter().next(),
        _ => Some(Node::And(filters)),
    };

    Ok(parsed)
}

fn parse_i64_param(name: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| TranslatorError::InvalidValue {
        column: name.to_string(),
        detail: format!("expected an integer, got `{raw}`"),
    })
}

/// An emitted SQL statement and its positional bind parameters, ready to
/// pass to `sqlx::query_with`.
#[derive(Debug, Clone)]
pub struct Translated {
    /// The SQL statement text, with `$1`, `$2`, ... placeholders.
    pub sql: String,
    /// Bind values, in placeholder order.
    pub params: Vec<SqlValue>,
}

/// Translate a parsed query against a specific relation into a full
/// `SELECT` statement.
///
/// `max_limit` bounds the emitted `LIMIT`: a request's `limit=` is clamped
/// down to it, and a request with no `limit=` at all gets it as the
/// default, so an unbounded `limit=` can never force a full-table scan.
///
/// # Errors
///
/// Returns [`TranslatorError::UnknownRelation`] if `schema.table` is not in
/// the catalog, or any of the filter/order/select errors documented on
/// their respective parsers.
pub fn translate_select(
    catalog: &Catalog,
    schema: &str,
    table_name: &str,
    parsed: &ParsedQuery,
    max_limit: i64,
) -> Result<Translated> {
    let table = catalog
        .table(schema, table_name)
        .ok_or_else(|| TranslatorError::UnknownRelation(format!("{schema}.{table_name}")))?;

    let mut emitter = Emitter::default();
    let columns_sql = emit::emit_select(catalog, table, &parsed.select)?;

    let mut sql = format!(
        "SELECT {columns_sql} FROM {}.{}",
        emit::quote_ident(schema),
        emit::quote_ident(table_name)
    );

    if let Some(node) = &parsed.filter {
        let where_sql = emit::emit_filter(table, node, &mut emitter)?;
        write!(sql, " WHERE {where_sql}").expect("String write is infallible");
    }

    if !parsed.order.is_empty() {
        let order_sql = emit::emit_order(table, &parsed.order, &mut emitter)?;
        write!(sql, " ORDER BY {order_sql}").expect("String write is infallible");
    }

    let limit = parsed.limit.map_or(max_limit, |requested| requested.clamp(0, max_limit));
    let placeholder = emitter.bind(SqlValue::I64(limit));
    write!(sql, " LIMIT ${placeholder}").expect("String write is infallible");

    if let Some(offset) = parsed.offset {
        let placeholder = emitter.bind(SqlValue::I64(offset));
        write!(sql, " OFFSET ${placeholder}").expect("String write is infallible");
    }

    Ok(Translated {
        sql,
        params: emitter.params,
    })
}

/// Translate only the `WHERE` predicate of a parsed query against a
/// relation, for reuse by mutating statements (`UPDATE`/`DELETE`) that
/// build the rest of the statement themselves.
///
/// # Errors
///
/// Returns an error if the relation is unknown or the filter references an
/// unknown column or malformed value. Returns `Ok(None)` (no params bound)
/// when the query carries no filter.
pub fn translate_where(
    catalog: &Catalog,
    schema: &str,
    table_name: &str,
    parsed: &ParsedQuery,
) -> Result<Option<Translated>> {
    let table = catalog
        .table(schema, table_name)
        .ok_or_else(|| TranslatorError::UnknownRelation(format!("{schema}.{table_name}")))?;

    let Some(node) = &parsed.filter else {
        return Ok(None);
    };

    let mut emitter = Emitter::default();
    let sql = emit::emit_filter(table, node, &mut emitter)?;
    Ok(Some(Translated {
        sql,
        params: emitter.params,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfront_introspect::{ColumnDescriptor, TableDescriptor};

    fn catalog() -> Catalog {
        Catalog {
            version: 1,
            tables: vec![TableDescriptor {
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
                        name: "age".into(),
                        position: 2,
                        pg_type: "integer".into(),
                        nullable: true,
                        has_default: false,
                        is_generated: false,
                    },
                ],
                primary_key: vec!["id".into()],
                foreign_keys: vec![],
                is_view: false,
                rls_enabled: true,
            }],
            functions: vec![],
        }
    }

    #[test]
    fn parses_implicit_and_across_repeated_keys() {
        let parsed = parse_query_string("age=gte.18&age=lte.30").unwrap();
        assert!(matches!(parsed.filter, Some(Node::And(children)) if children.len() == 2));
    }

    #[test]
    fn parses_reserved_params() {
        let parsed = parse_query_string("select=id,age&order=age.desc&limit=10&offset=5&count=exact").unwrap();
        assert_eq!(parsed.select.len(), 2);
        assert_eq!(parsed.order.len(), 1);
        assert_eq!(parsed.limit, Some(10));
        assert_eq!(parsed.offset, Some(5));
        assert_eq!(parsed.count, Some(CountMode::Exact));
    }

    #[test]
    fn translates_full_select_statement() {
        let catalog = catalog();
        let parsed = parse_query_string("age=gt.18&order=age.desc&limit=5").unwrap();
        let translated = translate_select(&catalog, "public", "widgets", &parsed, 1000).unwrap();
        assert_eq!(
            translated.sql,
            "SELECT \"widgets\".* FROM \"public\".\"widgets\" WHERE \"age\" > $1::integer ORDER BY \"age\" DESC LIMIT $2"
        );
        assert_eq!(translated.params, vec![SqlValue::I64(18), SqlValue::I64(5)]);
    }

    #[test]
    fn limit_is_clamped_to_the_configured_maximum() {
        let catalog = catalog();
        let parsed = parse_query_string("limit=10000").unwrap();
        let translated = translate_select(&catalog, "public", "widgets", &parsed, 200).unwrap();
        assert_eq!(translated.params, vec![SqlValue::I64(200)]);
    }

    #[test]
    fn missing_limit_defaults_to_the_configured_maximum() {
        let catalog = catalog();
        let parsed = parse_query_string("").unwrap();
        let translated = translate_select(&catalog, "public", "widgets", &parsed, 200).unwrap();
        assert_eq!(translated.params, vec![SqlValue::I64(200)]);
    }

    #[test]
    fn unknown_relation_is_rejected() {
        let catalog = catalog();
        let parsed = parse_query_string("").unwrap();
        assert!(matches!(
            translate_select(&catalog, "public", "missing", &parsed, 1000),
            Err(TranslatorError::UnknownRelation(_))
        ));
    }

    #[test]
    fn translate_where_returns_none_without_a_filter() {
        let catalog = catalog();
        let parsed = parse_query_string("select=id").unwrap();
        assert!(translate_where(&catalog, "public", "widgets", &parsed).unwrap().is_none());
    }
}
