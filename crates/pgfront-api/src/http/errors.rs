//! RFC9457-style API error wrapper.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pgfront_config::ConfigError;
use pgfront_data::DataError;
use pgfront_query::TranslatorError;
use pgfront_storage::StorageError;

use crate::http::constants::{
    PROBLEM_BAD_REQUEST, PROBLEM_CONFIG_INVALID, PROBLEM_CONFLICT, PROBLEM_ENV_OVERRIDE,
    PROBLEM_GONE, PROBLEM_INTERNAL, PROBLEM_NOT_FOUND, PROBLEM_PAYLOAD_TOO_LARGE,
    PROBLEM_PRECONDITION_FAILED, PROBLEM_RATE_LIMITED, PROBLEM_SERVICE_UNAVAILABLE,
    PROBLEM_SETUP_REQUIRED, PROBLEM_UNAUTHORIZED, PROBLEM_UNPROCESSABLE,
};
use crate::http::rate_limit::insert_rate_limit_headers;
use crate::models::{ProblemDetails, ProblemInvalidParam};

/// Structured API error with optional RFC9457 fields.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
    pub(crate) invalid_params: Option<Vec<ProblemInvalidParam>>,
    pub(crate) rate_limit: Option<ErrorRateLimitContext>,
}

#[derive(Debug)]
pub(crate) struct ErrorRateLimitContext {
    pub(crate) limit: u32,
    pub(crate) remaining: u32,
    pub(crate) retry_after: Option<Duration>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
            invalid_params: None,
            rate_limit: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn with_invalid_params(mut self, params: Vec<ProblemInvalidParam>) -> Self {
        self.invalid_params = Some(params);
        self
    }

    pub(crate) const fn with_rate_limit_headers(
        mut self,
        limit: u32,
        remaining: u32,
        retry_after: Option<Duration>,
    ) -> Self {
        self.rate_limit = Some(ErrorRateLimitContext {
            limit,
            remaining,
            retry_after,
        });
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(message)
    }

    pub(crate) fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            PROBLEM_UNAUTHORIZED,
            "authentication required",
        )
        .with_detail(detail)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            PROBLEM_NOT_FOUND,
            "resource not found",
        )
        .with_detail(detail)
    }

    pub(crate) fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, PROBLEM_CONFLICT, "conflict").with_detail(detail)
    }

    pub(crate) fn env_override(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            PROBLEM_ENV_OVERRIDE,
            "setting overridden by environment",
        )
        .with_detail(detail)
    }

    pub(crate) fn gone(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, PROBLEM_GONE, "resource gone").with_detail(detail)
    }

    pub(crate) fn precondition_failed(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PRECONDITION_FAILED,
            PROBLEM_PRECONDITION_FAILED,
            "precondition failed",
        )
        .with_detail(detail)
    }

    pub(crate) fn payload_too_large(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            PROBLEM_PAYLOAD_TOO_LARGE,
            "payload too large",
        )
        .with_detail(detail)
    }

    pub(crate) fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            PROBLEM_UNPROCESSABLE,
            "unprocessable entity",
        )
        .with_detail(detail)
    }

    pub(crate) fn setup_required(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            PROBLEM_SETUP_REQUIRED,
            "setup required",
        )
        .with_detail(detail)
    }

    pub(crate) fn config_invalid(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            PROBLEM_CONFIG_INVALID,
            "configuration invalid",
        )
        .with_detail(detail)
    }

    pub(crate) fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            PROBLEM_SERVICE_UNAVAILABLE,
            "service unavailable",
        )
        .with_detail(detail)
    }

    pub(crate) fn too_many_requests(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            PROBLEM_RATE_LIMITED,
            "rate limit exceeded",
        )
        .with_detail(detail)
    }
}

impl From<DataError> for ApiError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::UnknownColumn { column } => {
                Self::bad_request(format!("unknown column '{column}'")).with_invalid_params(vec![
                    ProblemInvalidParam {
                        pointer: format!("/{column}"),
                        message: "unknown column".to_string(),
                    },
                ])
            }
            DataError::ConflictTargetMissing { table } => {
                Self::bad_request(format!("no conflict target available for table '{table}'"))
            }
            DataError::MissingBatchFilter { table, operation } => Self::bad_request(format!(
                "batch {operation} on '{table}' requires a filter"
            )),
            DataError::MalformedGeoJson { column } => {
                Self::unprocessable(format!("malformed GeoJSON for column '{column}'"))
            }
            DataError::InvalidValue { column, detail } => {
                Self::unprocessable(format!("invalid value for '{column}': {detail}"))
                    .with_invalid_params(vec![ProblemInvalidParam {
                        pointer: format!("/{column}"),
                        message: detail,
                    }])
            }
            DataError::QueryTranslation { source } => Self::from(source),
            DataError::PathNotUtf8 { .. } | DataError::MigrationFailed { .. } => {
                Self::internal(error.to_string())
            }
            DataError::QueryFailed { .. } => Self::internal(error.to_string()),
        }
    }
}

impl From<TranslatorError> for ApiError {
    fn from(error: TranslatorError) -> Self {
        let kind = error.kind();
        Self::bad_request(error.to_string()).with_invalid_params(vec![ProblemInvalidParam {
            pointer: "/".to_string(),
            message: format!("{kind}: {error}"),
        }])
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { .. } => Self::not_found(error.to_string()),
            StorageError::Conflict { .. } => Self::conflict(error.to_string()),
            StorageError::PayloadTooLarge { .. } => Self::payload_too_large(error.to_string()),
            StorageError::InvalidChunkSize { .. }
            | StorageError::InvalidChunkIndex { .. }
            | StorageError::MimeTypeRejected { .. } => Self::unprocessable(error.to_string()),
            StorageError::InvalidSessionState { .. } => Self::conflict(error.to_string()),
            StorageError::IncompleteUpload { .. } => Self::precondition_failed(error.to_string()),
            StorageError::SignedUrlExpired => Self::gone(error.to_string()),
            StorageError::SignedUrlBadMac
            | StorageError::SignedUrlMalformed
            | StorageError::SignedUrlMethodMismatch { .. } => {
                Self::unauthorized(error.to_string())
            }
            StorageError::RateLimited { .. } => Self::too_many_requests(error.to_string()),
            StorageError::Config(source) => Self::from(source),
            StorageError::Data(source) => Self::from(source),
            StorageError::Io { .. } | StorageError::S3 { .. } | StorageError::Database { .. } | StorageError::Rls(_) => {
                Self::internal(error.to_string())
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(error: ConfigError) -> Self {
        match &error {
            ConfigError::ImmutableSetting { key } => {
                Self::config_invalid(error.to_string()).with_invalid_params(vec![
                    ProblemInvalidParam {
                        pointer: format!("/{key}"),
                        message: error.to_string(),
                    },
                ])
            }
            ConfigError::EnvOverride { key } => {
                Self::env_override(error.to_string()).with_invalid_params(vec![ProblemInvalidParam {
                    pointer: format!("/{key}"),
                    message: error.to_string(),
                }])
            }
            ConfigError::InvalidValue { key, reason } => {
                Self::config_invalid(error.to_string()).with_invalid_params(vec![
                    ProblemInvalidParam {
                        pointer: format!("/{key}"),
                        message: reason.clone(),
                    },
                ])
            }
            ConfigError::SetupTokenMissing
            | ConfigError::SetupTokenExpired
            | ConfigError::SetupTokenInvalid => Self::unauthorized(error.to_string()),
            ConfigError::SecretHashFailed { .. }
            | ConfigError::StoredHashInvalid { .. }
            | ConfigError::SecretDecryptFailed { .. }
            | ConfigError::NotificationPayloadInvalid
            | ConfigError::Database { .. }
            | ConfigError::DataAccess { .. } => Self::internal(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            invalid_params: self.invalid_params,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(rate) = self.rate_limit {
            insert_rate_limit_headers(
                response.headers_mut(),
                rate.limit,
                rate.remaining,
                rate.retry_after,
            );
        }
        response
    }
}
