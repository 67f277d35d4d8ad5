//! Settings/secrets resolver and admin identity service, backed by
//! `PostgreSQL`.
//!
//! `ConfigService` implements the three-tier `resolve(key)` contract
//! (env → DB → default) and owns the admin-identity tables (`api_keys`,
//! `setup_tokens`, `revoked_tokens`) that authenticate the admin HTTP
//! surface and CLI, orthogonal to end-user RLS `Identity`.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgNotification, PgPoolOptions};
use sqlx::{Postgres, Row};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    ApiKeyAuth, ApiKeyPatch, ApiKeyRateLimit, AppliedChanges, SecretMetadata, SecretPatch,
    Setting, SettingsChange, SettingsChangeset, SetupToken,
};
use crate::secrets;
use crate::validate::{env_var_name, validate_api_key_rate_limit};

const SETTINGS_CHANNEL: &str = "pgfront_settings_changed";

type Result<T> = ConfigResult<T>;

fn db_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> ConfigError {
    move |source| ConfigError::Database { operation, source }
}

fn built_in_default(key: &str) -> Option<Value> {
    match key {
        "email.from_address" => Some(Value::String("no-reply@localhost".to_string())),
        "email.smtp_host" => Some(Value::Null),
        "captcha.provider" => Some(Value::String("none".to_string())),
        "embeddings.provider" => Some(Value::String("none".to_string())),
        "storage.max_upload_bytes" => Some(Value::from(5_368_709_120_i64)),
        "signed_url.ttl_seconds" => Some(Value::from(3600)),
        "signed_url.rate_limit_per_minute" => Some(Value::from(100)),
        "query.max_limit" => Some(Value::from(1000)),
        _ => None,
    }
}

fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|detail| ConfigError::SecretHashFailed { detail })
}

fn verify_secret(stored_hash: &str, candidate: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|detail| ConfigError::StoredHashInvalid { detail })?;
    Ok(Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok())
}

fn generate_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn parse_api_key_rate_limit(value: &Option<Value>) -> Result<Option<ApiKeyRateLimit>> {
    let Some(value) = value else { return Ok(None) };
    let burst = value
        .get("burst")
        .and_then(Value::as_u64)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "rate_limit.burst".to_string(),
            reason: "missing or non-numeric".to_string(),
        })?;
    let per_seconds = value
        .get("per_seconds")
        .and_then(Value::as_u64)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "rate_limit.per_seconds".to_string(),
            reason: "missing or non-numeric".to_string(),
        })?;
    let limit = ApiKeyRateLimit {
        burst: u32::try_from(burst).unwrap_or(u32::MAX),
        replenish_period: Duration::from_secs(per_seconds),
    };
    validate_api_key_rate_limit(&limit)?;
    Ok(Some(limit))
}

/// Abstraction over the settings/secrets/admin-identity backend, so HTTP
/// handlers can be tested against a fake without a database.
#[async_trait]
pub trait SettingsFacade: Send + Sync {
    /// Resolve a setting's current value, per the env → DB → default
    /// layering contract.
    async fn resolve(&self, key: &str) -> Result<Setting>;
    /// Metadata view of a secret (never the decrypted plaintext).
    async fn secret_metadata(&self, key: &str) -> Result<SecretMetadata>;
    /// Subscribe to configuration change notifications.
    async fn subscribe_changes(&self) -> Result<SettingsStream>;
    /// Apply a structured changeset attributed to an actor and reason.
    async fn apply_changeset(
        &self,
        actor: &str,
        reason: &str,
        changeset: SettingsChangeset,
    ) -> Result<AppliedChanges>;
    /// Issue a new setup token with a given TTL.
    async fn issue_setup_token(&self, ttl: Duration, issued_by: &str) -> Result<SetupToken>;
    /// Permanently consume a setup token.
    async fn consume_setup_token(&self, token: &str) -> Result<()>;
    /// Validate an API key/secret pair, returning its authorization context.
    async fn authenticate_api_key(&self, key_id: &str, secret: &str) -> Result<Option<ApiKeyAuth>>;
    /// `true` iff at least one API key has been provisioned (used to decide
    /// whether the instance is still in first-boot setup mode).
    async fn has_api_keys(&self) -> Result<bool>;
    /// `true` iff `token_id` appears in the revocation denylist.
    async fn is_token_revoked(&self, token_id: &str) -> Result<bool>;
    /// Add `token_id` to the revocation denylist.
    async fn revoke_token(&self, token_id: &str, reason: Option<&str>) -> Result<()>;
}

/// Stream wrapper around a `PostgreSQL` LISTEN connection on the settings
/// change channel.
pub struct SettingsStream {
    listener: PgListener,
}

impl SettingsStream {
    /// Receive the next settings/secrets change notification.
    pub async fn next(&mut self) -> Option<Result<SettingsChange>> {
        match self.listener.recv().await {
            Ok(notification) => Some(parse_notification(&notification)),
            Err(source) => Some(Err(ConfigError::Database {
                operation: "listen_settings_changed",
                source,
            })),
        }
    }
}

fn parse_notification(notification: &PgNotification) -> Result<SettingsChange> {
    let value: Value = serde_json::from_str(notification.payload())
        .map_err(|_| ConfigError::NotificationPayloadInvalid)?;
    let table = value
        .get("table")
        .and_then(Value::as_str)
        .ok_or(ConfigError::NotificationPayloadInvalid)?
        .to_string();
    let key = value
        .get("key")
        .and_then(Value::as_str)
        .ok_or(ConfigError::NotificationPayloadInvalid)?
        .to_string();
    let operation = value
        .get("operation")
        .and_then(Value::as_str)
        .ok_or(ConfigError::NotificationPayloadInvalid)?
        .to_string();
    let revision = value
        .get("revision")
        .and_then(Value::as_i64)
        .ok_or(ConfigError::NotificationPayloadInvalid)?;
    Ok(SettingsChange {
        table,
        revision,
        key,
        operation,
    })
}

/// Concrete `SettingsFacade` implementation backed by `PostgreSQL` + `SQLx`.
#[derive(Clone)]
pub struct ConfigService {
    pool: sqlx::PgPool,
    database_url: String,
    master_key: Vec<u8>,
}

impl ConfigService {
    /// Establish a connection pool. The schema (tables, triggers,
    /// `pg_notify` wiring on `SETTINGS_CHANNEL`) is assumed already
    /// migrated; this service does not run migrations itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the `PostgreSQL` connection cannot be established.
    #[instrument(name = "config_service.new", skip(database_url, master_key))]
    pub async fn new(database_url: impl Into<String>, master_key: Vec<u8>) -> Result<Self> {
        let database_url = database_url.into();
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&database_url)
            .await
            .map_err(db_err("connect"))?;

        Ok(Self {
            pool,
            database_url,
            master_key,
        })
    }

    /// Access the underlying `SQLx` connection pool.
    #[must_use]
    pub const fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    /// Decrypt and return a secret's plaintext value. Only privileged
    /// callers (the admin HTTP surface's own subsystems, never an end-user
    /// route) should hold a `ConfigService` capable of calling this.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is unset or decryption fails.
    pub async fn reveal_secret(&self, key: &str) -> Result<Option<String>> {
        if let Ok(value) = env::var(env_var_name(key)) {
            return Ok(Some(value));
        }
        let row = sqlx::query("SELECT ciphertext FROM secrets WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("fetch_secret"))?;
        let Some(row) = row else { return Ok(None) };
        let ciphertext: String = row.try_get("ciphertext").map_err(db_err("fetch_secret"))?;
        let plaintext = secrets::decrypt(&self.master_key, key, &ciphertext)?;
        Ok(Some(plaintext))
    }

    /// Subscribe to changes and return the current resolved value of every
    /// setting alongside a watcher that yields updates as they arrive.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial listing or listener attachment fails.
    pub async fn watch_settings(
        &self,
        poll_interval: Duration,
    ) -> Result<(HashMap<String, Setting>, ConfigWatcher)> {
        let snapshot = self.list_settings().await?;
        let stream = match self.subscribe_changes().await {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!(error = ?err, "failed to initialize LISTEN stream; polling only");
                None
            }
        };

        let watcher = ConfigWatcher {
            service: self.clone(),
            stream,
            poll_interval,
            known_revisions: snapshot
                .values()
                .map(|setting| (setting.key.clone(), setting.revision))
                .collect(),
        };

        Ok((snapshot, watcher))
    }

    /// List every setting key currently stored in the DB layer, each
    /// resolved through the env/DB/default chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn list_settings(&self) -> Result<HashMap<String, Setting>> {
        let rows = sqlx::query("SELECT key, value, revision, created_at, updated_at FROM settings")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list_settings"))?;

        let mut settings = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key").map_err(db_err("list_settings"))?;
            let setting = self.resolve_from_row(&key, &row).await?;
            settings.insert(setting.key.clone(), setting);
        }
        Ok(settings)
    }

    async fn resolve_from_row(&self, key: &str, row: &sqlx::postgres::PgRow) -> Result<Setting> {
        if let Ok(raw) = env::var(env_var_name(key)) {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            return Ok(Setting {
                key: key.to_string(),
                value,
                overridden: true,
                revision: row.try_get("revision").map_err(db_err("resolve"))?,
                created_at: row.try_get("created_at").map_err(db_err("resolve"))?,
                updated_at: row.try_get("updated_at").map_err(db_err("resolve"))?,
            });
        }
        Ok(Setting {
            key: key.to_string(),
            value: row.try_get("value").map_err(db_err("resolve"))?,
            overridden: false,
            revision: row.try_get("revision").map_err(db_err("resolve"))?,
            created_at: row.try_get("created_at").map_err(db_err("resolve"))?,
            updated_at: row.try_get("updated_at").map_err(db_err("resolve"))?,
        })
    }
}

/// Watches settings changes, falling back to polling if LISTEN/NOTIFY
/// connectivity is interrupted.
///
/// Listens first, falls back to polling on a timer, and transparently
/// tries to reattach LISTEN once it recovers.
pub struct ConfigWatcher {
    service: ConfigService,
    stream: Option<SettingsStream>,
    poll_interval: Duration,
    known_revisions: HashMap<String, i64>,
}

impl ConfigWatcher {
    /// Await the next key whose resolved value changed, returning its fresh
    /// [`Setting`].
    ///
    /// # Errors
    ///
    /// Returns an error if polling or LISTEN handling fails.
    pub async fn next(&mut self) -> Result<Setting> {
        loop {
            if let Some(setting) = self.listen_once().await? {
                return Ok(setting);
            }

            tokio::time::sleep(self.poll_interval).await;

            if let Some(setting) = self.poll_once().await? {
                return Ok(setting);
            }
        }
    }

    /// Force the watcher into polling mode, discarding the current LISTEN
    /// stream.
    pub fn disable_listen(&mut self) {
        self.stream = None;
    }

    async fn listen_once(&mut self) -> Result<Option<Setting>> {
        if let Some(stream) = &mut self.stream {
            match stream.next().await {
                Some(Ok(change)) => {
                    let setting = self.service.resolve(&change.key).await?;
                    self.known_revisions.insert(setting.key.clone(), setting.revision);
                    return Ok(Some(setting));
                }
                Some(Err(err)) => {
                    warn!(error = ?err, "LISTEN connection dropped; switching to polling");
                    self.stream = None;
                }
                None => {
                    warn!("LISTEN stream closed; switching to polling");
                    self.stream = None;
                }
            }
        }
        Ok(None)
    }

    async fn poll_once(&mut self) -> Result<Option<Setting>> {
        let current = self.service.list_settings().await?;
        for setting in current.values() {
            let known = self.known_revisions.get(&setting.key).copied().unwrap_or(-1);
            if setting.revision > known {
                self.known_revisions.insert(setting.key.clone(), setting.revision);
                self.try_reattach_listen().await;
                return Ok(Some(setting.clone()));
            }
        }
        Ok(None)
    }

    async fn try_reattach_listen(&mut self) {
        if self.stream.is_some() {
            return;
        }
        match self.service.subscribe_changes().await {
            Ok(stream) => self.stream = Some(stream),
            Err(err) => warn!(error = ?err, "failed to re-establish LISTEN connection"),
        }
    }
}

#[async_trait]
impl SettingsFacade for ConfigService {
    async fn resolve(&self, key: &str) -> Result<Setting> {
        if let Ok(raw) = env::var(env_var_name(key)) {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            return Ok(Setting {
                key: key.to_string(),
                value,
                overridden: true,
                revision: 0,
                created_at: None,
                updated_at: None,
            });
        }

        let row = sqlx::query("SELECT value, revision, created_at, updated_at FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("resolve"))?;

        if let Some(row) = row {
            return Ok(Setting {
                key: key.to_string(),
                value: row.try_get("value").map_err(db_err("resolve"))?,
                overridden: false,
                revision: row.try_get("revision").map_err(db_err("resolve"))?,
                created_at: row.try_get("created_at").map_err(db_err("resolve"))?,
                updated_at: row.try_get("updated_at").map_err(db_err("resolve"))?,
            });
        }

        Ok(Setting {
            key: key.to_string(),
            value: built_in_default(key).unwrap_or(Value::Null),
            overridden: false,
            revision: 0,
            created_at: None,
            updated_at: None,
        })
    }

    async fn secret_metadata(&self, key: &str) -> Result<SecretMetadata> {
        if env::var(env_var_name(key)).is_ok() {
            return Ok(SecretMetadata {
                key: key.to_string(),
                set: true,
                overridden: true,
                updated_at: None,
            });
        }

        let row = sqlx::query("SELECT updated_at FROM secrets WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("secret_metadata"))?;

        Ok(match row {
            Some(row) => SecretMetadata {
                key: key.to_string(),
                set: true,
                overridden: false,
                updated_at: row.try_get("updated_at").map_err(db_err("secret_metadata"))?,
            },
            None => SecretMetadata {
                key: key.to_string(),
                set: false,
                overridden: false,
                updated_at: None,
            },
        })
    }

    async fn subscribe_changes(&self) -> Result<SettingsStream> {
        let mut listener = PgListener::connect(&self.database_url)
            .await
            .map_err(db_err("listen_connect"))?;
        listener
            .listen(SETTINGS_CHANNEL)
            .await
            .map_err(db_err("listen"))?;
        Ok(SettingsStream { listener })
    }

    async fn apply_changeset(
        &self,
        actor: &str,
        reason: &str,
        changeset: SettingsChangeset,
    ) -> Result<AppliedChanges> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;
        let mut changed_keys = Vec::new();

        for patch in &changeset.settings {
            if env::var(env_var_name(&patch.key)).is_ok() {
                return Err(ConfigError::EnvOverride {
                    key: patch.key.clone(),
                });
            }
            sqlx::query(
                "INSERT INTO settings (key, value, revision, updated_at)
                 VALUES ($1, $2, 1, now())
                 ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, revision = settings.revision + 1, updated_at = now()",
            )
            .bind(&patch.key)
            .bind(&patch.value)
            .execute(tx.as_mut())
            .await
            .map_err(db_err("write_setting"))?;
            changed_keys.push(patch.key.clone());
        }

        for patch in &changeset.secrets {
            match patch {
                SecretPatch::Set { name, value } => {
                    if env::var(env_var_name(name)).is_ok() {
                        return Err(ConfigError::EnvOverride { key: name.clone() });
                    }
                    let ciphertext = secrets::encrypt(&self.master_key, name, value);
                    sqlx::query(
                        "INSERT INTO secrets (key, ciphertext, revision, updated_at)
                         VALUES ($1, $2, 1, now())
                         ON CONFLICT (key) DO UPDATE
                         SET ciphertext = EXCLUDED.ciphertext, revision = secrets.revision + 1, updated_at = now()",
                    )
                    .bind(name)
                    .bind(&ciphertext)
                    .execute(tx.as_mut())
                    .await
                    .map_err(db_err("write_secret"))?;
                    changed_keys.push(name.clone());
                }
                SecretPatch::Delete { name } => {
                    sqlx::query("DELETE FROM secrets WHERE key = $1")
                        .bind(name)
                        .execute(tx.as_mut())
                        .await
                        .map_err(db_err("delete_secret"))?;
                    changed_keys.push(name.clone());
                }
            }
        }

        apply_api_key_patches(&mut tx, &changeset.api_keys).await?;

        if !changeset.is_empty() {
            sqlx::query(
                "INSERT INTO config_history (kind, actor, reason, created_at)
                 VALUES ('changeset', $1, $2, now())",
            )
            .bind(actor)
            .bind(reason)
            .execute(tx.as_mut())
            .await
            .map_err(db_err("write_history"))?;
        }

        let revision: i64 = sqlx::query_scalar("SELECT coalesce(max(revision), 0) FROM settings")
            .fetch_one(tx.as_mut())
            .await
            .map_err(db_err("fetch_revision"))?;

        tx.commit().await.map_err(db_err("commit"))?;

        Ok(AppliedChanges {
            revision,
            changed_keys,
        })
    }

    async fn issue_setup_token(&self, ttl: Duration, issued_by: &str) -> Result<SetupToken> {
        let chrono_ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::days(1));

        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;
        sqlx::query("DELETE FROM setup_tokens WHERE expires_at <= now() OR consumed_at IS NOT NULL")
            .execute(tx.as_mut())
            .await
            .map_err(db_err("cleanup_setup_tokens"))?;

        let plaintext = generate_token(32);
        let token_hash = hash_secret(&plaintext)?;
        let expires_at = Utc::now() + chrono_ttl;

        sqlx::query(
            "INSERT INTO setup_tokens (id, token_hash, expires_at, issued_by)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(&token_hash)
        .bind(expires_at)
        .bind(issued_by)
        .execute(tx.as_mut())
        .await
        .map_err(db_err("insert_setup_token"))?;

        tx.commit().await.map_err(db_err("commit"))?;

        info!(issued_by, expires_at = %expires_at, "setup token issued");

        Ok(SetupToken {
            plaintext,
            expires_at,
        })
    }

    async fn consume_setup_token(&self, token: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin"))?;

        let row = sqlx::query(
            "SELECT id, token_hash, expires_at FROM setup_tokens
             WHERE consumed_at IS NULL ORDER BY expires_at DESC LIMIT 1",
        )
        .fetch_optional(tx.as_mut())
        .await
        .map_err(db_err("fetch_setup_token"))?;

        let Some(row) = row else {
            return Err(ConfigError::SetupTokenMissing);
        };

        let id: Uuid = row.try_get("id").map_err(db_err("fetch_setup_token"))?;
        let token_hash: String = row.try_get("token_hash").map_err(db_err("fetch_setup_token"))?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(db_err("fetch_setup_token"))?;

        if expires_at <= Utc::now() {
            return Err(ConfigError::SetupTokenExpired);
        }
        if !verify_secret(&token_hash, token)? {
            return Err(ConfigError::SetupTokenInvalid);
        }

        sqlx::query("UPDATE setup_tokens SET consumed_at = now() WHERE id = $1")
            .bind(id)
            .execute(tx.as_mut())
            .await
            .map_err(db_err("consume_setup_token"))?;

        tx.commit().await.map_err(db_err("commit"))?;
        info!("setup token consumed successfully");
        Ok(())
    }

    async fn authenticate_api_key(&self, key_id: &str, secret: &str) -> Result<Option<ApiKeyAuth>> {
        let row = sqlx::query("SELECT secret_hash, label, enabled, rate_limit FROM api_keys WHERE key_id = $1")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("fetch_api_key"))?;

        let Some(row) = row else { return Ok(None) };
        let enabled: bool = row.try_get("enabled").map_err(db_err("fetch_api_key"))?;
        if !enabled {
            return Ok(None);
        }

        let secret_hash: String = row.try_get("secret_hash").map_err(db_err("fetch_api_key"))?;
        if !verify_secret(&secret_hash, secret)? {
            return Ok(None);
        }

        let label: Option<String> = row.try_get("label").map_err(db_err("fetch_api_key"))?;
        let rate_limit_raw: Option<Value> = row.try_get("rate_limit").map_err(db_err("fetch_api_key"))?;
        let rate_limit = parse_api_key_rate_limit(&rate_limit_raw)?;

        Ok(Some(ApiKeyAuth {
            key_id: key_id.to_string(),
            label,
            rate_limit,
        }))
    }

    async fn has_api_keys(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM api_keys")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count_api_keys"))?;
        Ok(count > 0)
    }

    async fn is_token_revoked(&self, token_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM revoked_tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("check_revoked_token"))?;
        Ok(count > 0)
    }

    async fn revoke_token(&self, token_id: &str, reason: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT INTO revoked_tokens (token_id, revoked_at, reason)
             VALUES ($1, now(), $2)
             ON CONFLICT (token_id) DO NOTHING",
        )
        .bind(token_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_err("revoke_token"))?;
        Ok(())
    }
}

async fn apply_api_key_patches(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    patches: &[ApiKeyPatch],
) -> Result<()> {
    for patch in patches {
        match patch {
            ApiKeyPatch::Upsert {
                key_id,
                label,
                enabled,
                secret,
                rate_limit,
            } => {
                parse_api_key_rate_limit(rate_limit)?;
                let secret_hash = match secret {
                    Some(secret) => Some(hash_secret(secret)?),
                    None => None,
                };
                sqlx::query(
                    "INSERT INTO api_keys (key_id, secret_hash, label, enabled, rate_limit, created_at)
                     VALUES ($1, coalesce($2, ''), $3, coalesce($4, true), $5, now())
                     ON CONFLICT (key_id) DO UPDATE SET
                        secret_hash = coalesce($2, api_keys.secret_hash),
                        label = coalesce($3, api_keys.label),
                        enabled = coalesce($4, api_keys.enabled),
                        rate_limit = coalesce($5, api_keys.rate_limit)",
                )
                .bind(key_id)
                .bind(secret_hash)
                .bind(label)
                .bind(enabled)
                .bind(rate_limit)
                .execute(tx.as_mut())
                .await
                .map_err(db_err("upsert_api_key"))?;
            }
            ApiKeyPatch::Delete { key_id } => {
                sqlx::query("DELETE FROM api_keys WHERE key_id = $1")
                    .bind(key_id)
                    .execute(tx.as_mut())
                    .await
                    .map_err(db_err("delete_api_key"))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_defaults_cover_the_documented_subsystems() {
        assert!(built_in_default("email.from_address").is_some());
        assert!(built_in_default("captcha.provider").is_some());
        assert!(built_in_default("embeddings.provider").is_some());
        assert!(built_in_default("storage.max_upload_bytes").is_some());
        assert!(built_in_default("query.max_limit").is_some());
        assert!(built_in_default("unknown.key").is_none());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_secret("correct horse battery staple").unwrap();
        assert!(verify_secret(&hash, "correct horse battery staple").unwrap());
        assert!(!verify_secret(&hash, "wrong").unwrap());
    }

    #[test]
    fn parses_rate_limit_payload() {
        let value = serde_json::json!({"burst": 10, "per_seconds": 60});
        let limit = parse_api_key_rate_limit(&Some(value)).unwrap().unwrap();
        assert_eq!(limit.burst, 10);
        assert_eq!(limit.replenish_period, Duration::from_secs(60));
    }

    #[test]
    fn rejects_malformed_rate_limit_payload() {
        let value = serde_json::json!({"burst": "not-a-number"});
        assert!(parse_api_key_rate_limit(&Some(value)).is_err());
    }
}
