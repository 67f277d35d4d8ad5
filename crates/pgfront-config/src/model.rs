//! Typed models for settings, secrets, and admin identity records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// A single resolved setting: the current value plus whether it is
/// currently pinned by an environment variable.
///
/// `resolve(key)` returns this: env-override if present, else the stored
/// DB value, else a built-in default — in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    /// Dotted setting key, e.g. `email.smtp_host`.
    pub key: String,
    /// Current value after resolving env/DB/default layering.
    pub value: Value,
    /// `true` iff an environment variable mapped to `key` is set; such
    /// settings reject writes through the admin API.
    pub overridden: bool,
    /// Monotonic revision at which this key was last changed in the DB
    /// layer (unaffected by env overrides, which have no revision).
    pub revision: i64,
    /// When the underlying DB row was first created, if one exists.
    pub created_at: Option<DateTime<Utc>>,
    /// When the underlying DB row was last updated, if one exists.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Metadata view of a secret. The plaintext value is never returned here —
/// only [`ConfigService::reveal_secret`](crate::service::ConfigService::reveal_secret)
/// decrypts on demand, and only for privileged callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretMetadata {
    /// Secret key.
    pub key: String,
    /// Whether a value is currently stored for this key.
    pub set: bool,
    /// Whether an environment variable overrides this secret.
    pub overridden: bool,
    /// When the stored ciphertext was last updated, if present.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Structured change payload emitted by LISTEN/NOTIFY on `settings`/`secrets`.
#[derive(Debug, Clone)]
pub struct SettingsChange {
    /// Table that triggered the notification (`settings` or `secrets`).
    pub table: String,
    /// Revision recorded after applying the change.
    pub revision: i64,
    /// Key that changed.
    pub key: String,
    /// Operation descriptor (`insert`, `update`, `delete`).
    pub operation: String,
}

/// A batch of setting/secret/API-key mutations applied atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsChangeset {
    /// Plain setting writes, keyed by setting key.
    pub settings: Vec<SettingPatch>,
    /// API key upserts/deletions included in the changeset.
    pub api_keys: Vec<ApiKeyPatch>,
    /// Secret store mutations included in the changeset.
    pub secrets: Vec<SecretPatch>,
}

impl SettingsChangeset {
    /// `true` iff the changeset carries no mutations at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.api_keys.is_empty() && self.secrets.is_empty()
    }
}

/// A single setting write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingPatch {
    /// Key to write.
    pub key: String,
    /// New value.
    pub value: Value,
}

/// Patch description for API keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ApiKeyPatch {
    /// Insert or update an API key record.
    Upsert {
        /// Identifier for the API key.
        key_id: String,
        /// Optional human-readable label.
        label: Option<String>,
        /// Optional enabled flag override.
        enabled: Option<bool>,
        /// Optional new secret value; hashed before storage.
        secret: Option<String>,
        /// Optional rate limit configuration payload.
        rate_limit: Option<Value>,
    },
    /// Remove an API key record.
    Delete {
        /// Identifier for the API key to remove.
        key_id: String,
    },
}

/// Patch description for secrets stored encrypted at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum SecretPatch {
    /// Insert or update a secret value. The plaintext is encrypted with
    /// the process master key before it ever reaches the database.
    Set {
        /// Secret key identifier.
        name: String,
        /// Secret plaintext, encrypted before storage.
        value: String,
    },
    /// Remove a secret entry.
    Delete {
        /// Secret key identifier to remove.
        name: String,
    },
}

/// Context returned after applying a changeset.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedChanges {
    /// Revision recorded after the changeset was applied.
    pub revision: i64,
    /// Keys whose resolved value may have changed, for callers that want
    /// to invoke subsystem `refreshFromSettings()` callbacks selectively.
    pub changed_keys: Vec<String>,
}

/// Token representation surfaced to the caller. The plaintext value is
/// only available at issuance time; only its hash is ever persisted.
#[derive(Debug, Clone)]
pub struct SetupToken {
    /// Clear-text token value (only returned at issuance time).
    pub plaintext: String,
    /// Expiration timestamp for the token.
    pub expires_at: DateTime<Utc>,
}

/// Authentication context returned for a validated API key.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    /// Unique identifier associated with the API key record.
    pub key_id: String,
    /// Optional human-readable label for the key.
    pub label: Option<String>,
    /// Optional token-bucket rate limit applied to requests.
    pub rate_limit: Option<ApiKeyRateLimit>,
}

/// Token-bucket rate limit configuration applied per API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRateLimit {
    /// Maximum number of requests allowed within a replenishment window.
    pub burst: u32,
    /// Duration between token replenishments.
    pub replenish_period: Duration,
}

impl ApiKeyRateLimit {
    /// Serialise the rate limit into a stable JSON representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "burst": self.burst,
            "per_seconds": self.replenish_period.as_secs(),
        })
    }
}

/// Entry in the JWT revocation denylist (spec.md §6 "Persisted state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedToken {
    /// Identifier of the revoked token (the JWT `jti` claim).
    pub token_id: String,
    /// When the token was revoked.
    pub revoked_at: DateTime<Utc>,
    /// Operator-supplied reason, for audit purposes.
    pub reason: Option<String>,
}

/// Minimal admin-dashboard account (data model + RPC surface only; no
/// dashboard UI is built, per Non-goals excluding dashboard assets).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardUser {
    /// Primary key.
    pub id: Uuid,
    /// Login email.
    pub email: String,
    /// Argon2 password hash.
    pub password_hash: String,
    /// Always `dashboard_admin`; kept as a field rather than a constant
    /// so the row shape matches a future multi-role admin model.
    pub role: String,
    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A pending invitation to create a [`DashboardUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    /// Primary key.
    pub id: Uuid,
    /// Invited email address.
    pub email: String,
    /// `key_id` of the API key (or `"system"`) that issued the invite.
    pub invited_by: String,
    /// Hash of the invitation token; the plaintext is only ever returned
    /// to the issuing caller.
    pub token_hash: String,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
    /// When the invitation was accepted, if it has been.
    pub accepted_at: Option<DateTime<Utc>>,
}
