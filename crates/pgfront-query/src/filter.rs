//! Filter grammar: `column=[not.]op.value`, plus `or=(...)`/`and=(...)`
//! nested groups.

use crate::error::{Result, TranslatorError};
use crate::tokenize::{split_first, split_top_level, strip_parens};

/// A comparison operator recognized in filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `eq`
    Eq,
    /// `neq`
    Neq,
    /// `gt`
    Gt,
    /// `gte`
    Gte,
    /// `lt`
    Lt,
    /// `lte`
    Lte,
    /// `like`
    Like,
    /// `ilike`
    ILike,
    /// `match` (`~`)
    Match,
    /// `imatch` (`~*`)
    IMatch,
    /// `in`
    In,
    /// `is`
    Is,
    /// `cs` (contains, `@>`)
    Cs,
    /// `cd` (contained by, `<@`)
    Cd,
    /// `ov` (overlap, `&&`)
    Ov,
    /// `sl` (strictly left of, `<<`)
    Sl,
    /// `sr` (strictly right of, `>>`)
    Sr,
    /// `nxl` (does not extend left of, `&>`)
    Nxl,
    /// `nxr` (does not extend right of, `&<`)
    Nxr,
    /// `adj` (adjacent to, `-|-`)
    Adj,
    /// `fts` (`@@ to_tsquery`)
    Fts,
    /// `plfts` (`@@ plainto_tsquery`)
    Plfts,
    /// `phfts` (`@@ phraseto_tsquery`)
    Phfts,
    /// `wfts` (`@@ websearch_to_tsquery`)
    Wfts,
}

impl Operator {
    pub(crate) fn parse(token: &str) -> Result<Self> {
        match token {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "like" => Ok(Self::Like),
            "ilike" => Ok(Self::ILike),
            "match" => Ok(Self::Match),
            "imatch" => Ok(Self::IMatch),
            "in" => Ok(Self::In),
            "is" => Ok(Self::Is),
            "cs" => Ok(Self::Cs),
            "cd" => Ok(Self::Cd),
            "ov" => Ok(Self::Ov),
            "sl" => Ok(Self::Sl),
            "sr" => Ok(Self::Sr),
            "nxl" => Ok(Self::Nxl),
            "nxr" => Ok(Self::Nxr),
            "adj" => Ok(Self::Adj),
            "fts" => Ok(Self::Fts),
            "plfts" => Ok(Self::Plfts),
            "phfts" => Ok(Self::Phfts),
            "wfts" => Ok(Self::Wfts),
            other => Err(TranslatorError::UnknownOperator(other.to_string())),
        }
    }

    /// Whether this operator's value is a comma-separated list rather than a
    /// single scalar.
    #[must_use]
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In)
    }
}

/// The raw (not-yet-type-checked) value side of a filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// A single literal.
    Scalar(String),
    /// A parenthesized, comma-separated literal list (`in.(1,2,3)`).
    List(Vec<String>),
}

/// A single leaf condition: `column [not.] operator value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column this condition applies to.
    pub column: String,
    /// Whether the condition is negated (`not.`).
    pub negated: bool,
    /// The comparison operator.
    pub operator: Operator,
    /// The raw, unparsed value.
    pub value: RawValue,
}

/// A node in the filter tree: a leaf condition, or a logical grouping of
/// child nodes produced by `and=`/`or=` (top level) or `and(...)`/`or(...)`
/// (nested).
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A single condition.
    Leaf(Condition),
    /// All children must hold.
    And(Vec<Node>),
    /// At least one child must hold.
    Or(Vec<Node>),
}

/// Parse the `op.value` (or `not.op.value`) portion of a top-level filter,
/// e.g. the right-hand side of `age=not.gt.18`.
///
/// # Errors
///
/// Returns [`TranslatorError::UnknownOperator`] or
/// [`TranslatorError::MalformedGroup`] on malformed input.
pub(crate) fn parse_op_value(expr: &str) -> Result<(bool, Operator, RawValue)> {
    let (first, rest) = split_first(expr, '.')
        .ok_or_else(|| TranslatorError::MalformedGroup(format!("missing operator in `{expr}`")))?;

    let (negated, op_token, value_str) = if first == "not" {
        let (op_token, value_str) = split_first(rest, '.').ok_or_else(|| {
            TranslatorError::MalformedGroup(format!("missing operator in `{expr}`"))
        })?;
        (true, op_token, value_str)
    } else {
        (false, first, rest)
    };

    let operator = Operator::parse(op_token)?;
    let value = parse_value(operator, value_str)?;
    Ok((negated, operator, value))
}

fn parse_value(operator: Operator, raw: &str) -> Result<RawValue> {
    if operator.takes_list() {
        let inner = strip_parens(raw)?;
        let items = split_top_level(inner, ',')
            .into_iter()
            .map(|item| item.trim().to_string())
            .collect();
        return Ok(RawValue::List(items));
    }
    Ok(RawValue::Scalar(raw.to_string()))
}

/// Parse a single `column.op.value` item, as found inside an `and(...)`/
/// `or(...)` group.
fn parse_leaf_item(item: &str) -> Result<Condition> {
    let (column, expr) = split_first(item, '.')
        .ok_or_else(|| TranslatorError::MalformedGroup(format!("missing operator in `{item}`")))?;
    let (negated, operator, value) = parse_op_value(expr)?;
    Ok(Condition {
        column: column.to_string(),
        negated,
        operator,
        value,
    })
}

/// Parse the body of an `and=`/`or=` group value, e.g. the part after the
/// `=` in `or=(age.gt.18,age.lt.21)`, including arbitrarily nested
/// `and(...)`/`or(...)` sub-groups.
///
/// # Errors
///
/// Returns [`TranslatorError::MalformedGroup`] for unbalanced parentheses or
/// an empty group.
pub(crate) fn parse_group(raw: &str, is_or: bool) -> Result<Node> {
    let inner = strip_parens(raw)?;
    let items = split_top_level(inner, ',');
    if items.iter().all(|item| item.trim().is_empty()) {
        return Err(TranslatorError::MalformedGroup("empty filter group".to_string()));
    }

    let mut children = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            return Err(TranslatorError::MalformedGroup("empty item in filter group".to_string()));
        }
        if let Some(body) = item.strip_prefix("and(").and_then(|rest| rest.strip_suffix(')')) {
            children.push(parse_group(&format!("({body})"), false)?);
        } else if let Some(body) = item.strip_prefix("or(").and_then(|rest| rest.strip_suffix(')')) {
            children.push(parse_group(&format!("({body})"), true)?);
        } else {
            children.push(Node::Leaf(parse_leaf_item(item)?));
        }
    }

    Ok(if is_or { Node::Or(children) } else { Node::And(children) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_top_level_condition() {
        let (negated, op, value) = parse_op_value("eq.5").unwrap();
        assert!(!negated);
        assert_eq!(op, Operator::Eq);
        assert_eq!(value, RawValue::Scalar("5".into()));
    }

    #[test]
    fn parses_negated_condition() {
        let (negated, op, _) = parse_op_value("not.gt.18").unwrap();
        assert!(negated);
        assert_eq!(op, Operator::Gt);
    }

    #[test]
    fn parses_in_list() {
        let (_, op, value) = parse_op_value("in.(1,2,3)").unwrap();
        assert_eq!(op, Operator::In);
        assert_eq!(value, RawValue::List(vec!["1".into(), "2".into(), "3".into()]));
    }

    #[test]
    fn rejects_unknown_operator() {
        assert!(matches!(
            parse_op_value("bogus.5"),
            Err(TranslatorError::UnknownOperator(_))
        ));
    }

    #[test]
    fn parses_flat_or_group() {
        let node = parse_group("(age.gt.18,age.lt.21)", true).unwrap();
        match node {
            Node::Or(children) => assert_eq!(children.len(), 2),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_group() {
        let node = parse_group("(or(a.eq.1,b.eq.2),c.eq.3)", false).unwrap();
        match node {
            Node::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], Node::Or(_)));
                assert!(matches!(children[1], Node::Leaf(_)));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_group() {
        assert!(parse_group("()", true).is_err());
    }
}
