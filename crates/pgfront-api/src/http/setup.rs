//! First-boot setup: issue a one-time setup token, then exchange it for
//! the instance's first admin API key.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pgfront_config::{ApiKeyPatch, SettingsChangeset, SettingsFacade};
use tracing::warn;
use uuid::Uuid;

use crate::app::state::{ApiState, BootstrapMode};
use crate::http::auth::{extract_setup_token, map_config_error, AuthContext};
use crate::http::errors::ApiError;
use pgfront_api_models::{SetupCompleteRequest, SetupCompleteResponse, SetupStartRequest, SetupStartResponse};

/// `POST /admin/setup/start` — issue a one-time setup token.
///
/// Refuses once an API key has been provisioned; from that point the
/// setup surface is permanently closed.
pub(crate) async fn setup_start(
    State(state): State<Arc<ApiState>>,
    payload: Option<Json<SetupStartRequest>>,
) -> Result<Response, ApiError> {
    let payload = payload.map_or_else(SetupStartRequest::default, |Json(body)| body);

    if BootstrapMode::resolve(&state.config).await.map_err(|err| map_config_error(err, "failed to resolve bootstrap mode"))? == BootstrapMode::Active {
        return Err(ApiError::conflict("instance is already configured"));
    }

    let issued_by = payload.label.unwrap_or_else(|| "setup".to_string());
    let token = state
        .config
        .issue_setup_token(state.setup_token_ttl, &issued_by)
        .await
        .map_err(|err| map_config_error(err, "failed to issue setup token"))?;

    let expires_in = (token.expires_at - chrono::Utc::now()).num_seconds().max(0);
    Ok((
        StatusCode::CREATED,
        Json(SetupStartResponse {
            setup_token: token.plaintext,
            expires_in,
        }),
    )
        .into_response())
}

/// `POST /admin/setup/complete` — consume the setup token and provision the
/// first admin API key.
pub(crate) async fn setup_complete(
    State(state): State<Arc<ApiState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<SetupCompleteRequest>,
) -> Result<Response, ApiError> {
    let token = extract_setup_token(context)?;
    if token != request.setup_token {
        return Err(ApiError::unauthorized("setup token mismatch"));
    }

    state
        .config
        .consume_setup_token(&token)
        .await
        .map_err(|err| map_config_error(err, "failed to consume setup token"))?;

    let key_id = Uuid::new_v4().simple().to_string();
    let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let changeset = SettingsChangeset {
        settings: Vec::new(),
        secrets: Vec::new(),
        api_keys: vec![ApiKeyPatch::Upsert {
            key_id: key_id.clone(),
            label: Some("bootstrap".to_string()),
            enabled: Some(true),
            secret: Some(secret.clone()),
            rate_limit: None,
        }],
    };

    state
        .config
        .apply_changeset("setup", "setup_complete", changeset)
        .await
        .map_err(|err| {
            warn!(error = %err, "failed to provision bootstrap api key");
            map_config_error(err, "failed to apply setup changes")
        })?;

    Ok((StatusCode::CREATED, Json(SetupCompleteResponse { key_id, secret })).into_response())
}
