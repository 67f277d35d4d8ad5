//! Parameterized SQL emission.
//!
//! Every literal that reaches these functions is bound through
//! [`crate::value::SqlValue`] and appended to the placeholder parameter
//! list; nothing from a request is ever concatenated into the SQL text
//! itself. Column and relation names are always validated against the
//! catalog before being written (double-quoted) into the statement, closing
//! off identifier-based injection as well as value-based injection.

use std::fmt::Write as _;

use pgfront_introspect::{Catalog, ForeignKeyDescriptor, TableDescriptor};

use crate::error::{Result, TranslatorError};
use crate::filter::{Condition, Node, Operator, RawValue};
use crate::order::{Direction, Nulls, OrderTerm};
use crate::select::SelectItem;
use crate::value::{SqlValue, parse_scalar};

/// Accumulates emitted SQL fragments and their bound parameters.
#[derive(Debug, Default)]
pub(crate) struct Emitter {
    pub(crate) params: Vec<SqlValue>,
}

impl Emitter {
    pub(crate) fn bind(&mut self, value: SqlValue) -> usize {
        self.params.push(value);
        self.params.len()
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Explicit `::type` cast suffix for a bound placeholder.
///
/// Every parameter is cast to the target column's reported Postgres type.
/// `pg_type` always comes from catalog introspection, never from request
/// input, so this is purely a type-inference aid, not a new injection
/// surface — but it closes off confusing ambiguous-type errors when a
/// column's type doesn't cleanly overload against the Rust value's native
/// OID (a `NULL` bound against a `numeric` column, for instance).
fn cast_suffix(pg_type: &str) -> String {
    format!("::{pg_type}")
}

fn require_column<'a>(table: &'a TableDescriptor, name: &str) -> Result<&'a pgfront_introspect::ColumnDescriptor> {
    table
        .column(name)
        .ok_or_else(|| TranslatorError::UnknownColumn(name.to_string()))
}

/// Emit a `WHERE`-clause boolean expression (without the `WHERE` keyword)
/// for a filter tree.
///
/// # Errors
///
/// Returns an error if any referenced column is unknown or a value fails to
/// parse into the column's type.
pub(crate) fn emit_filter(table: &TableDescriptor, node: &Node, emitter: &mut Emitter) -> Result<String> {
    match node {
        Node::Leaf(condition) => emit_condition(table, condition, emitter),
        Node::And(children) => emit_logical(table, children, "AND", emitter),
        Node::Or(children) => emit_logical(table, children, "OR", emitter),
    }
}

fn emit_logical(table: &TableDescriptor, children: &[Node], joiner: &str, emitter: &mut Emitter) -> Result<String> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        parts.push(emit_filter(table, child, emitter)?);
    }
    Ok(format!("({})", parts.join(&format!(" {joiner} "))))
}

fn emit_condition(table: &TableDescriptor, condition: &Condition, emitter: &mut Emitter) -> Result<String> {
    let column = require_column(table, &condition.column)?;
    let ident = quote_ident(&column.name);

    let body = match condition.operator {
        Operator::Is => emit_is(&condition.column, &condition.value)?,
        Operator::In => emit_in(column, &condition.value, emitter)?,
        _ => emit_scalar_comparison(condition.operator, column, &condition.value, emitter)?,
    };

    let expr = format!("{ident} {body}");
    Ok(if condition.negated {
        format!("NOT ({expr})")
    } else {
        expr
    })
}

fn scalar_literal<'a>(column: &str, value: &'a RawValue) -> Result<&'a str> {
    match value {
        RawValue::Scalar(text) => Ok(text.as_str()),
        RawValue::List(_) => Err(TranslatorError::InvalidValue {
            column: column.to_string(),
            detail: "expected a scalar value".to_string(),
        }),
    }
}

fn emit_is(column: &str, value: &RawValue) -> Result<String> {
    let text = scalar_literal(column, value)?;
    match text {
        "null" => Ok("IS NULL".to_string()),
        "true" => Ok("IS TRUE".to_string()),
        "false" => Ok("IS FALSE".to_string()),
        "unknown" => Ok("IS UNKNOWN".to_string()),
        other => Err(TranslatorError::InvalidValue {
            column: column.to_string(),
            detail: format!("`is` does not accept `{other}`; expected null/true/false/unknown"),
        }),
    }
}

fn emit_in(
    column: &pgfront_introspect::ColumnDescriptor,
    value: &RawValue,
    emitter: &mut Emitter,
) -> Result<String> {
    let RawValue::List(items) = value else {
        return Err(TranslatorError::InvalidValue {
            column: column.name.clone(),
            detail: "`in` requires a parenthesized list".to_string(),
        });
    };
    if items.is_empty() {
        return Err(TranslatorError::InvalidValue {
            column: column.name.clone(),
            detail: "`in` list must not be empty".to_string(),
        });
    }
    let mut placeholders = Vec::with_capacity(items.len());
    for item in items {
        let parsed = parse_scalar(&column.name, &column.pg_type, item)?;
        placeholders.push(format!("${}{}", emitter.bind(parsed), cast_suffix(&column.pg_type)));
    }
    Ok(format!("IN ({})", placeholders.join(", ")))
}

fn emit_scalar_comparison(
    operator: Operator,
    column: &pgfront_introspect::ColumnDescriptor,
    value: &RawValue,
    emitter: &mut Emitter,
) -> Result<String> {
    let text = scalar_literal(&column.name, value)?;

    if let Operator::Fts | Operator::Plfts | Operator::Phfts | Operator::Wfts = operator {
        let function = match operator {
            Operator::Fts => "to_tsquery",
            Operator::Plfts => "plainto_tsquery",
            Operator::Phfts => "phraseto_tsquery",
            Operator::Wfts => "websearch_to_tsquery",
            _ => unreachable!("guarded by outer match"),
        };
        let (lang, query) = extract_fts_config(text).unwrap_or_else(|| ("english".to_string(), text.to_string()));
        let placeholder = emitter.bind(SqlValue::Text(query));
        return Ok(format!("@@ {function}('{lang}', ${placeholder})", lang = lang.replace('\'', "")));
    }

    let parsed = parse_scalar(&column.name, &column.pg_type, text)?;
    let placeholder = format!("${}{}", emitter.bind(parsed), cast_suffix(&column.pg_type));

    let sql_op = match operator {
        Operator::Eq => "=",
        Operator::Neq => "<>",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Like => "LIKE",
        Operator::ILike => "ILIKE",
        Operator::Match => "~",
        Operator::IMatch => "~*",
        Operator::Cs => "@>",
        Operator::Cd => "<@",
        Operator::Ov => "&&",
        Operator::Sl => "<<",
        Operator::Sr => ">>",
        Operator::Nxl => "&>",
        Operator::Nxr => "&<",
        Operator::Adj => "-|-",
        Operator::Fts | Operator::Plfts | Operator::Phfts | Operator::Wfts => {
            unreachable!("handled by the early return above")
        }
        Operator::In | Operator::Is => unreachable!("handled by dedicated emitters"),
    };

    Ok(format!("{sql_op} {placeholder}"))
}

/// `(english).query` syntax for the text-search operators; falls back to
/// `simple` when no config is given.
fn extract_fts_config(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix('(')?;
    let (config, query) = rest.split_once(')')?;
    let query = query.strip_prefix('.').unwrap_or(query);
    Some((config.to_string(), query.to_string()))
}

/// Emit an `ORDER BY` clause body (without the `ORDER BY` keyword).
///
/// # Errors
///
/// Returns an error if a term references an unknown column.
pub(crate) fn emit_order(table: &TableDescriptor, terms: &[OrderTerm], emitter: &mut Emitter) -> Result<String> {
    let mut parts = Vec::with_capacity(terms.len());
    for term in terms {
        let column = require_column(table, &term.column)?;
        let ident = quote_ident(&column.name);

        if let Some(metric) = term.vector_metric {
            let reference = term.reference.clone().unwrap_or_default();
            let placeholder = emitter.bind(SqlValue::Text(reference));
            parts.push(format!(
                "{ident} {} ${placeholder}{}",
                metric.sql_operator(),
                cast_suffix(&column.pg_type)
            ));
            continue;
        }

        let direction = match term.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        let nulls = match term.nulls {
            Some(Nulls::First) => " NULLS FIRST",
            Some(Nulls::Last) => " NULLS LAST",
            None => "",
        };
        parts.push(format!("{ident} {direction}{nulls}"));
    }
    Ok(parts.join(", "))
}

/// Find the single foreign key linking `table` and `related`, in either
/// direction, optionally disambiguated by `fk_hint`.
///
/// # Errors
///
/// Returns [`TranslatorError::UnresolvedRelation`] if no foreign key
/// matches, or if more than one matches and no hint was given.
pub(crate) fn resolve_relation<'a>(
    catalog: &'a Catalog,
    table: &'a TableDescriptor,
    relation: &str,
    fk_hint: Option<&str>,
) -> Result<(&'a TableDescriptor, &'a ForeignKeyDescriptor, bool)> {
    let related = catalog
        .tables
        .iter()
        .find(|candidate| candidate.name == relation)
        .ok_or_else(|| TranslatorError::UnresolvedRelation(relation.to_string()))?;

    let mut candidates: Vec<(&ForeignKeyDescriptor, bool)> = Vec::new();
    for fk in &table.foreign_keys {
        if fk.referenced_table == related.name {
            candidates.push((fk, true));
        }
    }
    for fk in &related.foreign_keys {
        if fk.referenced_table == table.name {
            candidates.push((fk, false));
        }
    }

    if let Some(hint) = fk_hint {
        let matched = candidates
            .into_iter()
            .find(|(fk, _)| fk.name == hint)
            .ok_or_else(|| TranslatorError::UnresolvedRelation(relation.to_string()))?;
        return Ok((related, matched.0, matched.1));
    }

    match candidates.len() {
        1 => Ok((related, candidates[0].0, candidates[0].1)),
        0 => Err(TranslatorError::UnresolvedRelation(relation.to_string())),
        _ => Err(TranslatorError::UnresolvedRelation(format!(
            "{relation} (ambiguous: specify a foreign key with relation!fk_name)"
        ))),
    }
}

/// Emit the comma-separated column list for a top-level `select=`
/// projection, expanding nested relations into correlated JSON subqueries.
///
/// # Errors
///
/// Returns an error if a column, relation, or foreign key hint cannot be
/// resolved against the catalog.
pub(crate) fn emit_select(catalog: &Catalog, table: &TableDescriptor, items: &[SelectItem]) -> Result<String> {
    let mut out = String::new();
    let mut first = true;

    if items.is_empty() || items == [SelectItem::Star] {
        return Ok(format!("{}.*", quote_ident(&table.name)));
    }

    for item in items {
        if !first {
            out.push_str(", ");
        }
        first = false;

        match item {
            SelectItem::Star => write!(out, "{}.*", quote_ident(&table.name)).expect("String write is infallible"),
            SelectItem::Column { name, alias } => {
                require_column(table, name)?;
                let ident = quote_ident(name);
                match alias {
                    Some(alias) => write!(out, "{ident} AS {}", quote_ident(alias)),
                    None => write!(out, "{ident}"),
                }
                .expect("String write is infallible");
            }
            SelectItem::Relation {
                relation,
                alias,
                fk_hint,
                columns,
            } => {
                let (related, fk, owned_by_self) = resolve_relation(catalog, table, relation, fk_hint.as_deref())?;
                let nested = emit_select(catalog, related, columns)?;
                let output_key = alias.clone().unwrap_or_else(|| relation.clone());
                let subquery = emit_relation_subquery(table, related, fk, owned_by_self, &nested);
                write!(out, "({subquery}) AS {}", quote_ident(&output_key))
                    .expect("String write is infallible");
            }
        }
    }

    Ok(out)
}

fn emit_relation_subquery(
    parent: &TableDescriptor,
    related: &TableDescriptor,
    fk: &ForeignKeyDescriptor,
    owned_by_self: bool,
    nested_columns: &str,
) -> String {
    let related_ident = format!("{}.{}", quote_ident(&related.schema), quote_ident(&related.name));
    let parent_alias = quote_ident(&parent.name);
    let related_alias = quote_ident(&related.name);

    let join_pairs: Vec<String> = if owned_by_self {
        fk.columns
            .iter()
            .zip(&fk.referenced_columns)
            .map(|(local, remote)| {
                format!(
                    "{parent_alias}.{} = {related_alias}.{}",
                    quote_ident(local),
                    quote_ident(remote)
                )
            })
            .collect()
    } else {
        fk.columns
            .iter()
            .zip(&fk.referenced_columns)
            .map(|(related_col, parent_col)| {
                format!(
                    "{related_alias}.{} = {parent_alias}.{}",
                    quote_ident(related_col),
                    quote_ident(parent_col)
                )
            })
            .collect()
    };
    let predicate = join_pairs.join(" AND ");

    if owned_by_self {
        format!(
            "SELECT to_jsonb(t) FROM (SELECT {nested_columns} FROM {related_ident} AS {related_alias} WHERE {predicate}) AS t"
        )
    } else {
        format!(
            "SELECT coalesce(jsonb_agg(to_jsonb(t)), '[]'::jsonb) FROM (SELECT {nested_columns} FROM {related_ident} AS {related_alias} WHERE {predicate}) AS t"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfront_introspect::ColumnDescriptor;

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
                    name: "age".into(),
                    position: 2,
                    pg_type: "integer".into(),
                    nullable: true,
                    has_default: false,
                    is_generated: false,
                },
                ColumnDescriptor {
                    name: "name".into(),
                    position: 3,
                    pg_type: "text".into(),
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
    fn emits_simple_equality() {
        let table = widgets_table();
        let node = Node::Leaf(Condition {
            column: "age".into(),
            negated: false,
            operator: Operator::Eq,
            value: RawValue::Scalar("18".into()),
        });
        let mut emitter = Emitter::default();
        let sql = emit_filter(&table, &node, &mut emitter).unwrap();
        assert_eq!(sql, "\"age\" = $1::integer");
        assert_eq!(emitter.params, vec![SqlValue::I64(18)]);
    }

    #[test]
    fn rejects_unknown_column() {
        let table = widgets_table();
        let node = Node::Leaf(Condition {
            column: "nope".into(),
            negated: false,
            operator: Operator::Eq,
            value: RawValue::Scalar("1".into()),
        });
        let mut emitter = Emitter::default();
        assert!(matches!(
            emit_filter(&table, &node, &mut emitter),
            Err(TranslatorError::UnknownColumn(_))
        ));
    }

    #[test]
    fn sql_injection_literals_are_bound_not_concatenated() {
        let table = widgets_table();
        const OWASP_SQLI_CORPUS: &[&str] = &[
            "' OR '1'='1",
            "'; DROP TABLE widgets; --",
            "' UNION SELECT password FROM users --",
            "admin'--",
            "' OR 1=1 --",
            "\"; DELETE FROM widgets WHERE \"\"=\"",
        ];
        for payload in OWASP_SQLI_CORPUS {
            let node = Node::Leaf(Condition {
                column: "name".into(),
                negated: false,
                operator: Operator::Eq,
                value: RawValue::Scalar((*payload).to_string()),
            });
            let mut emitter = Emitter::default();
            let sql = emit_filter(&table, &node, &mut emitter).unwrap();
            assert_eq!(sql, "\"name\" = $1::text");
            assert!(!sql.contains(payload), "payload leaked into SQL text: {sql}");
            assert_eq!(emitter.params, vec![SqlValue::Text((*payload).to_string())]);
        }
    }

    #[test]
    fn emits_negated_and_grouped_conditions() {
        let table = widgets_table();
        let node = Node::Or(vec![
            Node::Leaf(Condition {
                column: "age".into(),
                negated: false,
                operator: Operator::Gt,
                value: RawValue::Scalar("18".into()),
            }),
            Node::Leaf(Condition {
                column: "age".into(),
                negated: true,
                operator: Operator::Lt,
                value: RawValue::Scalar("5".into()),
            }),
        ]);
        let mut emitter = Emitter::default();
        let sql = emit_filter(&table, &node, &mut emitter).unwrap();
        assert_eq!(sql, "(\"age\" > $1::integer OR NOT (\"age\" < $2::integer))");
    }

    #[test]
    fn emits_in_list_with_one_placeholder_per_item() {
        let table = widgets_table();
        let node = Node::Leaf(Condition {
            column: "age".into(),
            negated: false,
            operator: Operator::In,
            value: RawValue::List(vec!["1".into(), "2".into(), "3".into()]),
        });
        let mut emitter = Emitter::default();
        let sql = emit_filter(&table, &node, &mut emitter).unwrap();
        assert_eq!(sql, "\"age\" IN ($1::integer, $2::integer, $3::integer)");
        assert_eq!(emitter.params.len(), 3);
    }

    #[test]
    fn emits_order_by_with_vector_distance() {
        let table = widgets_table();
        let terms = vec![OrderTerm {
            column: "age".into(),
            direction: Direction::Desc,
            nulls: Some(Nulls::Last),
            vector_metric: None,
            reference: None,
        }];
        let mut emitter = Emitter::default();
        let sql = emit_order(&table, &terms, &mut emitter).unwrap();
        assert_eq!(sql, "\"age\" DESC NULLS LAST");
    }

    #[test]
    fn select_star_defaults_to_table_wildcard() {
        let table = widgets_table();
        let catalog = Catalog {
            version: 1,
            tables: vec![table.clone()],
            functions: vec![],
        };
        assert_eq!(emit_select(&catalog, &table, &[]).unwrap(), "\"widgets\".*");
    }
}
