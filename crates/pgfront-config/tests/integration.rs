use pgfront_config::{
    ApiKeyPatch, ConfigService, SecretPatch, SettingPatch, SettingsChangeset, SettingsFacade,
};
use pgfront_test_support::start_postgres;
use std::time::Duration;

async fn setup_schema(pool: &sqlx::PgPool) {
    sqlx::query(
        r"
        CREATE TABLE settings (
            key text PRIMARY KEY,
            value jsonb NOT NULL,
            revision bigint NOT NULL DEFAULT 1,
            created_at timestamptz NOT NULL DEFAULT now(),
            updated_at timestamptz NOT NULL DEFAULT now()
        );
        CREATE TABLE secrets (
            key text PRIMARY KEY,
            ciphertext text NOT NULL,
            revision bigint NOT NULL DEFAULT 1,
            created_at timestamptz NOT NULL DEFAULT now(),
            updated_at timestamptz NOT NULL DEFAULT now()
        );
        CREATE TABLE api_keys (
            key_id text PRIMARY KEY,
            secret_hash text NOT NULL,
            label text,
            enabled boolean NOT NULL DEFAULT true,
            rate_limit jsonb,
            created_at timestamptz NOT NULL DEFAULT now()
        );
        CREATE TABLE setup_tokens (
            id uuid PRIMARY KEY,
            token_hash text NOT NULL,
            expires_at timestamptz NOT NULL,
            issued_by text NOT NULL,
            consumed_at timestamptz
        );
        CREATE TABLE revoked_tokens (
            token_id text PRIMARY KEY,
            revoked_at timestamptz NOT NULL DEFAULT now(),
            reason text
        );
        CREATE TABLE config_history (
            id bigserial PRIMARY KEY,
            kind text NOT NULL,
            actor text NOT NULL,
            reason text NOT NULL,
            created_at timestamptz NOT NULL DEFAULT now()
        );
        ",
    )
    .execute(pool)
    .await
    .expect("failed to create settings schema");
}

#[tokio::test]
async fn resolves_and_mutates_settings_with_override_reporting() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping resolves_and_mutates_settings_with_override_reporting: {error}");
            return Ok(());
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database.connection_string())
        .await?;
    setup_schema(&pool).await;

    let service =
        ConfigService::new(database.connection_string(), b"integration-test-master-key-32b!".to_vec())
            .await?;

    let default_setting = service.resolve("captcha.provider").await?;
    assert_eq!(default_setting.value, serde_json::json!("none"));
    assert!(!default_setting.overridden);

    let changes = SettingsChangeset {
        settings: vec![SettingPatch {
            key: "captcha.provider".to_string(),
            value: serde_json::json!("hcaptcha"),
        }],
        api_keys: vec![ApiKeyPatch::Upsert {
            key_id: "ci-key".to_string(),
            label: Some("ci".to_string()),
            enabled: Some(true),
            secret: Some("super-secret".to_string()),
            rate_limit: Some(serde_json::json!({"burst": 10, "per_seconds": 60})),
        }],
        secrets: vec![SecretPatch::Set {
            name: "email.smtp_password".to_string(),
            value: "hunter2".to_string(),
        }],
    };

    let applied = service.apply_changeset("tester", "integration", changes).await?;
    assert!(applied.changed_keys.contains(&"captcha.provider".to_string()));
    assert!(applied.changed_keys.contains(&"email.smtp_password".to_string()));

    let updated = service.resolve("captcha.provider").await?;
    assert_eq!(updated.value, serde_json::json!("hcaptcha"));
    assert!(updated.revision > default_setting.revision);

    let secret_meta = service.secret_metadata("email.smtp_password").await?;
    assert!(secret_meta.set);
    assert!(!secret_meta.overridden);

    let revealed = service.reveal_secret("email.smtp_password").await?;
    assert_eq!(revealed.as_deref(), Some("hunter2"));

    let auth = service
        .authenticate_api_key("ci-key", "super-secret")
        .await?
        .expect("api key should authenticate");
    assert_eq!(auth.key_id, "ci-key");
    assert_eq!(auth.rate_limit.expect("rate limit").burst, 10);

    assert!(service.authenticate_api_key("ci-key", "wrong-secret").await?.is_none());
    assert!(service.has_api_keys().await?);

    Ok(())
}

#[tokio::test]
async fn setup_tokens_are_single_use() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping setup_tokens_are_single_use: {error}");
            return Ok(());
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database.connection_string())
        .await?;
    setup_schema(&pool).await;

    let service =
        ConfigService::new(database.connection_string(), b"integration-test-master-key-32b!".to_vec())
            .await?;

    let issued = service.issue_setup_token(Duration::from_secs(60), "tester").await?;
    service.consume_setup_token(&issued.plaintext).await?;

    let result = service.consume_setup_token(&issued.plaintext).await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn revoked_tokens_are_remembered() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping revoked_tokens_are_remembered: {error}");
            return Ok(());
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database.connection_string())
        .await?;
    setup_schema(&pool).await;

    let service =
        ConfigService::new(database.connection_string(), b"integration-test-master-key-32b!".to_vec())
            .await?;

    assert!(!service.is_token_revoked("jti-1").await?);
    service.revoke_token("jti-1", Some("compromised")).await?;
    assert!(service.is_token_revoked("jti-1").await?);
    Ok(())
}
