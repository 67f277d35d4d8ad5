//! Translator error taxonomy.
//!
//! Every variant maps to a stable `kind` string surfaced by the HTTP layer as
//! part of an RFC 9457 problem document, with `column`/`operator` folded into
//! `invalid_params` entries.

use thiserror::Error;

/// Errors raised while translating a PostgREST-style query string into SQL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslatorError {
    /// The request referenced a column that does not exist on the target
    /// relation.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    /// The request used a filter operator this translator does not support.
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
    /// A filter value could not be parsed into the column's Postgres type.
    #[error("invalid value for column `{column}`: {detail}")]
    InvalidValue {
        /// Column the value was bound to.
        column: String,
        /// Human-readable explanation.
        detail: String,
    },
    /// An `and=(...)`/`or=(...)` group was malformed (unbalanced
    /// parentheses, empty group, trailing comma, etc).
    #[error("malformed filter group: {0}")]
    MalformedGroup(String),
    /// A nested `select=` projection referenced a relation with no matching
    /// foreign key, or the relation name was ambiguous between multiple
    /// foreign keys.
    #[error("cannot resolve relation `{0}` from foreign keys")]
    UnresolvedRelation(String),
    /// `order=` referenced an unsupported direction or nulls modifier.
    #[error("invalid order clause: {0}")]
    InvalidOrder(String),
    /// The relation this query targets does not exist in the catalog.
    #[error("unknown relation `{0}`")]
    UnknownRelation(String),
}

impl TranslatorError {
    /// Stable machine-readable discriminator for the HTTP error body.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownColumn(_) => "invalid_column",
            Self::UnknownOperator(_) => "invalid_operator",
            Self::InvalidValue { .. } => "invalid_value",
            Self::MalformedGroup(_) => "malformed_group",
            Self::UnresolvedRelation(_) => "unresolved_relation",
            Self::InvalidOrder(_) => "invalid_order",
            Self::UnknownRelation(_) => "unknown_relation",
        }
    }
}

/// Result alias for translator operations.
pub type Result<T> = std::result::Result<T, TranslatorError>;
