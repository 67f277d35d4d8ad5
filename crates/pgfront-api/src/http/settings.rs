//! Admin settings/secrets endpoints: resolved setting values (env → DB →
//! default layering), secret metadata (never plaintext), and changeset
//! application.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pgfront_config::{SettingsChangeset, SettingsFacade};
use pgfront_events::Event;

use crate::app::state::ApiState;
use crate::http::auth::{map_config_error, AuthContext};
use crate::http::errors::ApiError;
use pgfront_api_models::{SecretMetadataView, SettingView};

fn actor(context: AuthContext) -> Result<String, ApiError> {
    match context {
        AuthContext::ApiKey { key_id } => Ok(key_id),
        AuthContext::SetupToken(_) | AuthContext::User(_) => Err(ApiError::internal(
            "invalid authentication context for admin settings access",
        )),
    }
}

/// `GET /admin/settings` — every resolved setting.
pub(crate) async fn list_settings(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let settings = state
        .config
        .list_settings()
        .await
        .map_err(|err| map_config_error(err, "failed to list settings"))?;
    let mut views: Vec<SettingView> = settings.values().map(SettingView::from).collect();
    views.sort_by(|a, b| a.key.cmp(&b.key));
    Ok((StatusCode::OK, Json(views)).into_response())
}

/// `GET /admin/settings/{key}` — a single resolved setting.
pub(crate) async fn get_setting(State(state): State<Arc<ApiState>>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let setting = state
        .config
        .resolve(&key)
        .await
        .map_err(|err| map_config_error(err, "failed to resolve setting"))?;
    Ok((StatusCode::OK, Json(SettingView::from(&setting))).into_response())
}

/// `GET /admin/secrets/{key}` — secret metadata, never the plaintext.
pub(crate) async fn get_secret_metadata(State(state): State<Arc<ApiState>>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let metadata = state
        .config
        .secret_metadata(&key)
        .await
        .map_err(|err| map_config_error(err, "failed to resolve secret metadata"))?;
    Ok((StatusCode::OK, Json(SecretMetadataView::from(&metadata))).into_response())
}

/// `PATCH /admin/settings` — apply a batch of setting/secret/API-key
/// mutations atomically.
pub(crate) async fn patch_settings(
    State(state): State<Arc<ApiState>>,
    Extension(context): Extension<AuthContext>,
    Json(changeset): Json<SettingsChangeset>,
) -> Result<Response, ApiError> {
    let actor = actor(context)?;

    let applied = state
        .config
        .apply_changeset(&actor, "admin_settings_patch", changeset)
        .await
        .map_err(|err| map_config_error(err, "failed to apply settings changeset"))?;

    for key in &applied.changed_keys {
        let _ = state.events.publish(Event::SettingsChanged { key: key.clone() });
    }

    Ok((StatusCode::OK, Json(applied)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_rejects_non_api_key_contexts() {
        assert!(actor(AuthContext::SetupToken("token".into())).is_err());
    }
}
