//! Authentication and authorization middleware for the HTTP layer.

use std::sync::Arc;

use axum::{extract::State, http::Request, middleware::Next, response::Response};
use pgfront_config::{ConfigError, SettingsFacade, jwt};
use pgfront_data::Identity;
use pgfront_telemetry::record_app_mode;
use tracing::{error, warn};

use crate::app::state::{ApiState, BootstrapMode};
use crate::http::constants::{HEADER_API_KEY, HEADER_API_KEY_LEGACY, HEADER_SETUP_TOKEN};
use crate::http::errors::ApiError;
use crate::http::rate_limit::insert_rate_limit_headers;
use crate::models::ProblemInvalidParam;

/// Authentication context attached to a request once a middleware succeeds.
#[derive(Clone)]
pub(crate) enum AuthContext {
    /// A setup token was validated for the `/admin/setup/*` flow.
    SetupToken(String),
    /// An operator API key was validated.
    ApiKey {
        /// Identifier of the validated key.
        key_id: String,
    },
    /// An end-user JWT was validated and resolved to an RLS identity.
    User(Identity),
}

fn mode_label(mode: BootstrapMode) -> &'static str {
    match mode {
        BootstrapMode::Setup => "setup",
        BootstrapMode::Active => "active",
    }
}

/// Require a valid setup token and that the instance is still in [`BootstrapMode::Setup`].
///
/// # Errors
///
/// Returns an error if the instance is already active, the header is missing, or it is not
/// valid UTF-8.
pub(crate) async fn require_setup_token(
    State(state): State<Arc<ApiState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let mode = BootstrapMode::resolve(&state.config).await.map_err(|err| {
        error!(error = %err, "failed to resolve bootstrap mode");
        ApiError::internal("failed to resolve bootstrap mode")
    })?;
    record_app_mode(mode_label(mode));

    if mode != BootstrapMode::Setup {
        return Err(ApiError::setup_required(
            "system is not accepting setup requests",
        ));
    }

    let header_value = req
        .headers()
        .get(HEADER_SETUP_TOKEN)
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("missing setup token"))?;
    let token = header_value
        .to_str()
        .map_err(|_| ApiError::bad_request("setup token header must be valid UTF-8"))?
        .trim()
        .to_string();

    req.extensions_mut().insert(AuthContext::SetupToken(token));

    Ok(next.run(req).await)
}

/// Require a valid operator API key and that the instance is in [`BootstrapMode::Active`].
///
/// # Errors
///
/// Returns an error if the instance is still in setup mode, the key is missing/invalid, or the
/// key's rate limit has been exceeded.
pub(crate) async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let mode = BootstrapMode::resolve(&state.config).await.map_err(|err| {
        error!(error = %err, "failed to resolve bootstrap mode");
        ApiError::internal("failed to resolve bootstrap mode")
    })?;
    record_app_mode(mode_label(mode));

    if mode != BootstrapMode::Active {
        return Err(ApiError::setup_required("system is still in setup mode"));
    }

    let api_key_raw = extract_api_key(&req)
        .ok_or_else(|| ApiError::unauthorized("missing API key header or query parameter"))?;

    let (key_id, secret) = api_key_raw
        .split_once(':')
        .ok_or_else(|| ApiError::unauthorized("API key must be provided as key_id:secret"))?;

    let auth = state
        .config
        .authenticate_api_key(key_id, secret)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to verify API key");
            ApiError::internal("failed to verify API key")
        })?;

    let Some(auth) = auth else {
        return Err(ApiError::unauthorized("invalid API key"));
    };

    let rate_snapshot = match state.enforce_rate_limit(&auth.key_id, auth.rate_limit.as_ref()) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            return Err(ApiError::too_many_requests(
                "API key rate limit exceeded; try again later",
            )
            .with_rate_limit_headers(err.limit, 0, Some(err.retry_after)));
        }
    };

    req.extensions_mut().insert(AuthContext::ApiKey {
        key_id: auth.key_id,
    });

    let mut response = next.run(req).await;
    if let Some(snapshot) = rate_snapshot {
        insert_rate_limit_headers(
            response.headers_mut(),
            snapshot.limit,
            snapshot.remaining,
            None,
        );
    }
    Ok(response)
}

/// Resolve an optional end-user `Authorization: Bearer` JWT to an [`Identity`] for data-plane
/// routes, defaulting to the anonymous identity when no token is presented.
///
/// # Errors
///
/// Returns an error if a presented token fails signature/expiry verification or has been
/// revoked.
pub(crate) async fn resolve_identity(
    State(state): State<Arc<ApiState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = match extract_bearer_token(&req) {
        Some(token) => jwt::verify(&state.config, &token, &state.jwt_secret)
            .await
            .map_err(|err| map_config_error(err, "failed to verify end-user token"))?,
        None => Identity::anonymous(),
    };

    req.extensions_mut().insert(AuthContext::User(identity));
    Ok(next.run(req).await)
}

/// Extract the validated [`Identity`] attached by [`resolve_identity`].
///
/// # Errors
///
/// Returns an error if the extension is absent or carries a non-user context.
pub(crate) fn extract_identity(context: AuthContext) -> Result<Identity, ApiError> {
    match context {
        AuthContext::User(identity) => Ok(identity),
        AuthContext::SetupToken(_) | AuthContext::ApiKey { .. } => Err(ApiError::internal(
            "end-user identity required for this operation",
        )),
    }
}

pub(crate) fn extract_setup_token(context: AuthContext) -> Result<String, ApiError> {
    match context {
        AuthContext::SetupToken(token) => Ok(token),
        AuthContext::ApiKey { .. } | AuthContext::User(_) => Err(ApiError::internal(
            "setup token required for this operation",
        )),
    }
}

pub(crate) fn extract_api_key(req: &Request<axum::body::Body>) -> Option<String> {
    let header_value = req
        .headers()
        .get(HEADER_API_KEY)
        .or_else(|| req.headers().get(HEADER_API_KEY_LEGACY))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(value) = header_value {
        return Some(value.to_string());
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("api_key=")
                && !value.is_empty()
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn extract_bearer_token(req: &Request<axum::body::Body>) -> Option<String> {
    let header_value = req.headers().get(axum::http::header::AUTHORIZATION)?;
    let text = header_value.to_str().ok()?.trim();
    text.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn map_config_error(err: ConfigError, context: &'static str) -> ApiError {
    warn!(error = %err, operation = context, "config error");
    let params = invalid_params_for_config_error(&err);
    let api_error = ApiError::from(err);
    if params.is_empty() {
        api_error
    } else {
        api_error.with_invalid_params(params)
    }
}

pub(crate) fn invalid_params_for_config_error(error: &ConfigError) -> Vec<ProblemInvalidParam> {
    match error {
        ConfigError::ImmutableSetting { key } | ConfigError::EnvOverride { key } => {
            vec![ProblemInvalidParam {
                pointer: pointer_for(key),
                message: error.to_string(),
            }]
        }
        ConfigError::InvalidValue { key, reason } => vec![ProblemInvalidParam {
            pointer: pointer_for(key),
            message: reason.clone(),
        }],
        _ => Vec::new(),
    }
}

pub(crate) fn pointer_for(key: &str) -> String {
    let mut pointer = String::from("/");
    pointer.push_str(&encode_pointer_segment(key));
    pointer
}

pub(crate) fn encode_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use pgfront_config::ConfigService;
    use pgfront_events::EventBus;
    use pgfront_introspect::SchemaCache;
    use pgfront_storage::{LocalBackend, StorageService};
    use pgfront_telemetry::Metrics;
    use pgfront_test_support::start_postgres;
    use serde_json::json;
    use tower::ServiceExt;

    async fn build_state() -> Result<Option<Arc<ApiState>>> {
        let database = match start_postgres() {
            Ok(database) => database,
            Err(error) => {
                eprintln!("skipping http::auth test: {error}");
                return Ok(None);
            }
        };
        let config = ConfigService::new(
            database.connection_string(),
            b"http-auth-test-master-key-32byte".to_vec(),
        )
        .await?;
        let pool = config.pool().clone();
        let events = EventBus::with_capacity(4);
        let backend = Arc::new(LocalBackend::new(std::env::temp_dir().join(format!(
            "pgfront-http-auth-test-{}",
            uuid::Uuid::new_v4()
        ))));
        let storage = StorageService::new(
            pool.clone(),
            backend,
            config.clone(),
            events.clone(),
            Metrics::new()?,
        );
        Ok(Some(Arc::new(ApiState::new(
            Arc::new(config),
            pool,
            SchemaCache::new(),
            storage,
            Metrics::new()?,
            Arc::new(json!({})),
            events,
            b"test-jwt-secret".to_vec(),
        ))))
    }

    fn router_with_state(state: &Arc<ApiState>) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .with_state(state.clone())
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_api_key,
            ))
    }

    fn setup_router_with_state(state: &Arc<ApiState>) -> Router {
        Router::new()
            .route("/", get(|| async { "setup" }))
            .with_state(state.clone())
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_setup_token,
            ))
    }

    #[tokio::test]
    async fn require_api_key_rejects_missing_and_invalid_when_no_keys_exist() -> Result<()> {
        let Some(state) = build_state().await? else {
            return Ok(());
        };
        let app = router_with_state(&state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        Ok(())
    }

    #[tokio::test]
    async fn require_setup_token_rejects_missing_header_in_setup_mode() -> Result<()> {
        let Some(state) = build_state().await? else {
            return Ok(());
        };
        let app = setup_router_with_state(&state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[test]
    fn pointer_for_escapes_tilde_and_slash() {
        assert_eq!(pointer_for("a~b/c"), "/a~0b~1c");
    }

    #[test]
    fn extract_api_key_reads_legacy_header() {
        let req = Request::builder()
            .uri("/")
            .header(HEADER_API_KEY_LEGACY, "legacy:secret")
            .body(Body::empty())
            .expect("request builds");
        assert_eq!(extract_api_key(&req), Some("legacy:secret".to_string()));
    }
}
