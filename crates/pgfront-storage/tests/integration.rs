use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use pgfront_config::ConfigService;
use pgfront_data::{Identity, Role};
use pgfront_events::EventBus;
use pgfront_storage::model::{ChunkedUploadOptions, StorageBackendKind};
use pgfront_storage::{LocalBackend, StorageError, StorageService};
use pgfront_telemetry::Metrics;
use pgfront_test_support::start_postgres;

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
        CREATE TABLE buckets (
            id text PRIMARY KEY,
            public boolean NOT NULL DEFAULT false,
            allowed_mime_types text[] NOT NULL DEFAULT '{}',
            max_file_size bigint,
            created_at timestamptz NOT NULL DEFAULT now(),
            updated_at timestamptz NOT NULL DEFAULT now()
        );
        CREATE TABLE objects (
            id uuid PRIMARY KEY,
            bucket_id text NOT NULL REFERENCES buckets(id) ON DELETE CASCADE,
            path text NOT NULL,
            size bigint NOT NULL,
            mime_type text,
            metadata jsonb NOT NULL DEFAULT '{}',
            owner_id uuid,
            created_at timestamptz NOT NULL DEFAULT now(),
            updated_at timestamptz NOT NULL DEFAULT now(),
            UNIQUE (bucket_id, path)
        );
        CREATE TABLE chunked_upload_sessions (
            session_id uuid PRIMARY KEY,
            bucket text NOT NULL,
            key text NOT NULL,
            total_size bigint NOT NULL,
            chunk_size bigint NOT NULL,
            total_chunks integer NOT NULL,
            completed_chunks jsonb NOT NULL DEFAULT '[]',
            part_etags jsonb NOT NULL DEFAULT '{}',
            status text NOT NULL,
            expires_at timestamptz NOT NULL,
            created_at timestamptz NOT NULL DEFAULT now(),
            owner_id uuid,
            backend text NOT NULL,
            s3_multipart_id text
        );
        ",
    )
    .execute(pool)
    .await
    .expect("failed to create storage schema");
}

async fn build_service(database_url: &str) -> anyhow::Result<StorageService> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    setup_schema(&pool).await;

    let config = ConfigService::new(database_url, b"integration-test-master-key-32b!".to_vec()).await?;
    let backend = Arc::new(LocalBackend::new(std::env::temp_dir().join(format!("pgfront-storage-test-{}", uuid::Uuid::new_v4()))));
    let events = EventBus::new();
    let metrics = Metrics::new()?;

    Ok(StorageService::new(pool, backend, config, events, metrics))
}

#[tokio::test]
async fn creates_and_lists_buckets() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping creates_and_lists_buckets: {error}");
            return Ok(());
        }
    };
    let service = build_service(database.connection_string()).await?;
    let identity = Identity::authenticated("user-1".to_string(), Role::ServiceRole);

    let created = service.create_bucket(&identity, "avatars", true, &["image/png".to_string()], Some(1_048_576)).await?;
    assert_eq!(created.id, "avatars");
    assert!(created.public);

    let buckets = service.list_buckets(&identity).await?;
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].id, "avatars");

    let conflict = service.create_bucket(&identity, "avatars", false, &[], None).await;
    assert!(matches!(conflict, Err(StorageError::Conflict { kind: "bucket", .. })));

    Ok(())
}

#[tokio::test]
async fn rejects_object_over_bucket_size_limit() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping rejects_object_over_bucket_size_limit: {error}");
            return Ok(());
        }
    };
    let service = build_service(database.connection_string()).await?;
    let identity = Identity::authenticated("user-1".to_string(), Role::ServiceRole);

    service.create_bucket(&identity, "tiny", false, &[], Some(4)).await?;

    let result = service.put_object(&identity, "tiny", "a.bin", b"too big", None).await;
    assert!(matches!(result, Err(StorageError::PayloadTooLarge { .. })));

    let ok = service.put_object(&identity, "tiny", "ok.bin", b"fit!", None).await?;
    assert_eq!(ok.size, 4);

    Ok(())
}

#[tokio::test]
async fn chunked_upload_completes_once_every_part_lands() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping chunked_upload_completes_once_every_part_lands: {error}");
            return Ok(());
        }
    };
    let service = build_service(database.connection_string()).await?;
    let identity = Identity::authenticated("user-1".to_string(), Role::ServiceRole);

    service.create_bucket(&identity, "uploads", false, &[], None).await?;

    let opts = ChunkedUploadOptions { ttl: ChronoDuration::hours(1) };
    let session = service
        .init_upload(&identity, "uploads", "big.bin", 11, 5 * 1024 * 1024, StorageBackendKind::Local, opts)
        .await?;
    assert_eq!(session.total_chunks, 1);

    let incomplete = service.complete_upload(&identity, session.session_id).await;
    assert!(matches!(incomplete, Err(StorageError::IncompleteUpload { .. })));

    service.upload_chunk(&identity, session.session_id, 0, b"hello world").await?;
    let object = service.complete_upload(&identity, session.session_id).await?;
    assert_eq!(object.size, 11);

    let missing = service.session_status(&identity, session.session_id).await;
    assert!(matches!(missing, Err(StorageError::NotFound { kind: "session", .. })));

    Ok(())
}

#[tokio::test]
async fn abort_discards_a_chunked_session() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping abort_discards_a_chunked_session: {error}");
            return Ok(());
        }
    };
    let service = build_service(database.connection_string()).await?;
    let identity = Identity::authenticated("user-1".to_string(), Role::ServiceRole);

    service.create_bucket(&identity, "uploads", false, &[], None).await?;
    let opts = ChunkedUploadOptions { ttl: ChronoDuration::hours(1) };
    let session = service
        .init_upload(&identity, "uploads", "partial.bin", 11, 5 * 1024 * 1024, StorageBackendKind::Local, opts)
        .await?;

    service.upload_chunk(&identity, session.session_id, 0, b"hello world").await?;
    service.abort_upload(&identity, session.session_id).await?;

    let status = service.session_status(&identity, session.session_id).await;
    assert!(matches!(status, Err(StorageError::NotFound { kind: "session", .. })));

    Ok(())
}

#[tokio::test]
async fn sweeper_aborts_expired_sessions() -> anyhow::Result<()> {
    let database = match start_postgres() {
        Ok(database) => database,
        Err(error) => {
            eprintln!("skipping sweeper_aborts_expired_sessions: {error}");
            return Ok(());
        }
    };
    let service = build_service(database.connection_string()).await?;
    let identity = Identity::authenticated("user-1".to_string(), Role::ServiceRole);

    service.create_bucket(&identity, "uploads", false, &[], None).await?;
    let opts = ChunkedUploadOptions { ttl: ChronoDuration::seconds(-1) };
    let session = service
        .init_upload(&identity, "uploads", "stale.bin", 11, 5 * 1024 * 1024, StorageBackendKind::Local, opts)
        .await?;

    let swept = service.sweep_expired_sessions().await?;
    assert_eq!(swept, 1);

    let status = service.session_status(&identity, session.session_id).await;
    assert!(matches!(status, Err(StorageError::NotFound { kind: "session", .. })));

    Ok(())
}
