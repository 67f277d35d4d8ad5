//! Error types for schema introspection.

use thiserror::Error;

/// Errors raised while introspecting or caching the live catalog.
#[derive(Debug, Error)]
pub enum IntrospectError {
    /// A catalog query failed.
    #[error("catalog query failed: {0}")]
    Query(#[from] sqlx::Error),
    /// The `LISTEN`-based watcher could not be established and polling is
    /// required instead.
    #[error("failed to attach schema change listener: {0}")]
    Listen(#[source] sqlx::Error),
}

/// Result alias for introspection operations.
pub type Result<T> = std::result::Result<T, IntrospectError>;
