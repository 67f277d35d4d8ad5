//! # Design
//!
//! - Centralize application-level errors for bootstrap and background tasks.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: pgfront_config::ConfigError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: pgfront_api::ApiServerError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: pgfront_telemetry::TelemetryError,
    },
    /// Schema introspection operations failed.
    #[error("schema introspection failed")]
    Introspect {
        /// Operation identifier.
        operation: &'static str,
        /// Source introspection error.
        source: pgfront_introspect::IntrospectError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: pgfront_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn api_server(operation: &'static str, source: pgfront_api::ApiServerError) -> Self {
        Self::ApiServer { operation, source }
    }

    pub(crate) const fn telemetry(operation: &'static str, source: pgfront_telemetry::TelemetryError) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn introspect(operation: &'static str, source: pgfront_introspect::IntrospectError) -> Self {
        Self::Introspect { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn app_error_helpers_build_variants() -> Result<(), Box<dyn Error>> {
        let Err(json_error) = serde_json::from_str::<serde_json::Value>("invalid") else {
            return Err(io::Error::other("expected invalid json").into());
        };
        let config = AppError::config(
            "load",
            pgfront_config::ConfigError::InvalidValue { key: "bind_addr".to_string(), reason: "bad".to_string() },
        );
        assert!(matches!(config, AppError::Config { .. }));

        let api = AppError::api_server("serve", pgfront_api::ApiServerError::Serve { source: io::Error::other("io") });
        assert!(matches!(api, AppError::ApiServer { .. }));

        let telemetry = AppError::telemetry("init", pgfront_telemetry::TelemetryError::OpenApiSerialize { source: json_error });
        assert!(matches!(telemetry, AppError::Telemetry { .. }));

        let introspect = AppError::introspect("refresh", pgfront_introspect::IntrospectError::Listen(sqlx::Error::PoolClosed));
        assert!(matches!(introspect, AppError::Introspect { .. }));
        Ok(())
    }
}
