//! `order=` clause parsing, including vector similarity ordering
//! (`vec_cos`/`vec_l2`/`vec_ip`) for `pgvector`-backed columns.

use crate::error::{Result, TranslatorError};
use crate::tokenize::split_top_level;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// `NULL` placement relative to non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    /// `NULLS FIRST`.
    First,
    /// `NULLS LAST`.
    Last,
}

/// Vector distance metric for similarity ordering against a reference
/// vector literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMetric {
    /// Cosine distance (`<=>`).
    Cosine,
    /// Euclidean distance (`<->`).
    L2,
    /// Negative inner product (`<#>`).
    InnerProduct,
}

impl VectorMetric {
    /// The `pgvector` distance operator for this metric.
    #[must_use]
    pub const fn sql_operator(self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::L2 => "<->",
            Self::InnerProduct => "<#>",
        }
    }
}

/// A single `order=` term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    /// Column (or, for vector ordering, the vector column) to order by.
    pub column: String,
    /// Sort direction. Defaults to ascending.
    pub direction: Direction,
    /// Explicit nulls placement, if given.
    pub nulls: Option<Nulls>,
    /// Vector distance metric, for `vec_cos`/`vec_l2`/`vec_ip` terms.
    pub vector_metric: Option<VectorMetric>,
    /// Reference vector literal to compare against, required alongside
    /// `vector_metric`.
    pub reference: Option<String>,
}

/// Parse the full `order=` query parameter value into an ordered list of
/// terms.
///
/// # Errors
///
/// Returns [`TranslatorError::InvalidOrder`] for unrecognized modifiers or a
/// vector term missing its reference literal.
pub(crate) fn parse_order(raw: &str) -> Result<Vec<OrderTerm>> {
    split_top_level(raw, ',')
        .iter()
        .map(|term| term.trim())
        .filter(|term| !term.is_empty())
        .map(parse_order_term)
        .collect()
}

fn parse_order_term(raw: &str) -> Result<OrderTerm> {
    let mut parts = raw.splitn(3, '.');
    let column = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TranslatorError::InvalidOrder(format!("missing column in `{raw}`")))?
        .to_string();

    let Some(second) = parts.next() else {
        return Ok(OrderTerm {
            column,
            direction: Direction::Asc,
            nulls: None,
            vector_metric: None,
            reference: None,
        });
    };

    let vector_metric = match second {
        "vec_cos" => Some(VectorMetric::Cosine),
        "vec_l2" => Some(VectorMetric::L2),
        "vec_ip" => Some(VectorMetric::InnerProduct),
        _ => None,
    };

    if let Some(metric) = vector_metric {
        let reference = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                TranslatorError::InvalidOrder(format!("vector order `{raw}` is missing a reference literal"))
            })?
            .to_string();
        return Ok(OrderTerm {
            column,
            direction: Direction::Asc,
            nulls: None,
            vector_metric: Some(metric),
            reference: Some(reference),
        });
    }

    let mut direction = Direction::Asc;
    let mut nulls = None;
    for token in std::iter::once(second).chain(parts) {
        match token {
            "asc" => direction = Direction::Asc,
            "desc" => direction = Direction::Desc,
            "nullsfirst" => nulls = Some(Nulls::First),
            "nullslast" => nulls = Some(Nulls::Last),
            other => {
                return Err(TranslatorError::InvalidOrder(format!(
                    "unrecognized order modifier `{other}`"
                )));
            }
        }
    }

    Ok(OrderTerm {
        column,
        direction,
        nulls,
        vector_metric: None,
        reference: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_column() {
        let terms = parse_order("name").unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].direction, Direction::Asc);
    }

    #[test]
    fn parses_direction_and_nulls() {
        let terms = parse_order("age.desc.nullslast").unwrap();
        assert_eq!(terms[0].direction, Direction::Desc);
        assert_eq!(terms[0].nulls, Some(Nulls::Last));
    }

    #[test]
    fn parses_multiple_terms() {
        let terms = parse_order("age.desc,name.asc").unwrap();
        assert_eq!(terms.len(), 2);
    }

    #[test]
    fn parses_vector_ordering() {
        let terms = parse_order("embedding.vec_cos.[0.1,0.2,0.3]").unwrap();
        assert_eq!(terms[0].vector_metric, Some(VectorMetric::Cosine));
        assert_eq!(terms[0].reference.as_deref(), Some("[0.1,0.2,0.3]"));
    }

    #[test]
    fn rejects_vector_ordering_without_reference() {
        assert!(parse_order("embedding.vec_cos").is_err());
    }

    #[test]
    fn rejects_unknown_modifier() {
        assert!(parse_order("age.sideways").is_err());
    }
}
