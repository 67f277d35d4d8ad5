//! Bucket/object metadata, chunked upload orchestration, and signed-URL
//! issuance, backed by `PostgreSQL` plus a pluggable [`StorageBackend`].

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use pgfront_config::{ApiKeyRateLimit, ConfigService, SettingsFacade};
use pgfront_data::{Identity, RlsRepository};
use pgfront_events::{Event, EventBus, UploadSessionState};
use pgfront_telemetry::Metrics;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{PartHandle, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::model::{Bucket, ChunkedUploadOptions, ChunkedUploadSession, Object, StorageBackendKind, UploadStatus};
use crate::rate_limit::IpRateLimiter;
use crate::signed_url;

type Result<T> = StorageResult<T>;

fn db_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |source| StorageError::Database { operation, source }
}

/// Minimum part size accepted for non-final chunks, per spec.md's
/// multipart-equivalent semantics.
const MIN_CHUNK_SIZE: i64 = 5 * 1024 * 1024;

/// Bucket/object metadata, chunked upload sessions, and signed-URL issuance.
#[derive(Clone)]
pub struct StorageService {
    pool: PgPool,
    backend: Arc<dyn StorageBackend>,
    config: ConfigService,
    events: EventBus,
    metrics: Metrics,
    rate_limiter: Arc<IpRateLimiter>,
}

impl StorageService {
    /// Construct a service over `backend`, using `config` to resolve
    /// upload-size limits and the signed-URL signing secret.
    #[must_use]
    pub fn new(pool: PgPool, backend: Arc<dyn StorageBackend>, config: ConfigService, events: EventBus, metrics: Metrics) -> Self {
        Self {
            pool,
            backend,
            config,
            events,
            metrics,
            rate_limiter: Arc::new(IpRateLimiter::new()),
        }
    }

    async fn max_upload_bytes(&self) -> Result<u64> {
        let setting = self.config.resolve("storage.max_upload_bytes").await?;
        Ok(setting.value.as_u64().unwrap_or(5_368_709_120))
    }

    async fn signing_secret(&self) -> Result<Vec<u8>> {
        match self.config.reveal_secret("storage.signing_secret").await? {
            Some(secret) => Ok(secret.into_bytes()),
            None => Ok(b"pgfront-insecure-development-signing-secret".to_vec()),
        }
    }

    async fn signed_url_ttl(&self) -> Result<StdDuration> {
        let setting = self.config.resolve("signed_url.ttl_seconds").await?;
        Ok(StdDuration::from_secs(setting.value.as_u64().unwrap_or(3600)))
    }

    async fn signed_url_rate_limit(&self) -> Result<ApiKeyRateLimit> {
        let setting = self.config.resolve("signed_url.rate_limit_per_minute").await?;
        let burst = u32::try_from(setting.value.as_u64().unwrap_or(100)).unwrap_or(100);
        Ok(ApiKeyRateLimit {
            burst,
            replenish_period: StdDuration::from_secs(60),
        })
    }

    // ---- buckets ---------------------------------------------------

    /// List every bucket visible to `identity`.
    pub async fn list_buckets(&self, identity: &Identity) -> Result<Vec<Bucket>> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        let rows = repo
            .with_rls(|tx| {
                Box::pin(async move {
                    sqlx::query("SELECT id, public, allowed_mime_types, max_file_size, created_at, updated_at FROM buckets ORDER BY id")
                        .fetch_all(&mut **tx)
                        .await
                        .map_err(anyhow::Error::from)
                })
            })
            .await
            .map_err(StorageError::Rls)?;
        rows.iter().map(bucket_from_row).collect()
    }

    /// Create a bucket. Fails with [`StorageError::Conflict`] if the id is
    /// already taken.
    pub async fn create_bucket(
        &self,
        identity: &Identity,
        id: &str,
        public: bool,
        allowed_mime_types: &[String],
        max_file_size: Option<i64>,
    ) -> Result<Bucket> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        let id_owned = id.to_string();
        let mime_types = allowed_mime_types.to_vec();
        let row = repo
            .with_rls(move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO buckets (id, public, allowed_mime_types, max_file_size, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, now(), now())
                         RETURNING id, public, allowed_mime_types, max_file_size, created_at, updated_at",
                    )
                    .bind(&id_owned)
                    .bind(public)
                    .bind(&mime_types)
                    .bind(max_file_size)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(anyhow::Error::from)
                })
            })
            .await
            .map_err(|error| match error.downcast_ref::<sqlx::Error>() {
                Some(sqlx::Error::Database(db)) if db.is_unique_violation() => StorageError::Conflict {
                    kind: "bucket",
                    id: id.to_string(),
                },
                _ => StorageError::Rls(error),
            })?;
        bucket_from_row(&row)
    }

    /// Delete a bucket and every object/permission row beneath it.
    pub async fn delete_bucket(&self, identity: &Identity, id: &str) -> Result<()> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        let id_owned = id.to_string();
        repo.with_rls(move |tx| {
            Box::pin(async move {
                sqlx::query("DELETE FROM buckets WHERE id = $1")
                    .bind(&id_owned)
                    .execute(&mut **tx)
                    .await
                    .map_err(anyhow::Error::from)
            })
        })
        .await
        .map_err(StorageError::Rls)?;
        Ok(())
    }

    // ---- objects ---------------------------------------------------

    /// Upload a complete object in a single call (non-chunked path).
    pub async fn put_object(
        &self,
        identity: &Identity,
        bucket: &str,
        path: &str,
        body: &[u8],
        mime_type: Option<&str>,
    ) -> Result<Object> {
        let bucket_row = self.require_bucket(identity, bucket).await?;
        self.enforce_bucket_policy(&bucket_row, body.len() as u64, mime_type)?;

        self.backend.put_object(bucket, path, body).await?;

        let owner_id = identity.subject.as_deref().and_then(|subject| Uuid::parse_str(subject).ok());
        self.upsert_object(identity, bucket, path, body.len() as i64, mime_type, owner_id).await
    }

    /// Fetch an object's bytes. Callers must already have authorized access
    /// (RLS policy, bucket visibility, or a validated signed URL).
    pub async fn get_object_bytes(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.backend.get_object(bucket, path).await
    }

    /// Delete an object's bytes and metadata row.
    pub async fn delete_object(&self, identity: &Identity, bucket: &str, path: &str) -> Result<()> {
        self.backend.delete_object(bucket, path).await?;

        let repo = RlsRepository::new(&self.pool, identity.clone());
        let bucket_owned = bucket.to_string();
        let path_owned = path.to_string();
        repo.with_rls(move |tx| {
            Box::pin(async move {
                sqlx::query("DELETE FROM objects WHERE bucket_id = $1 AND path = $2")
                    .bind(&bucket_owned)
                    .bind(&path_owned)
                    .execute(&mut **tx)
                    .await
                    .map_err(anyhow::Error::from)
            })
        })
        .await
        .map_err(StorageError::Rls)?;
        Ok(())
    }

    async fn require_bucket(&self, identity: &Identity, bucket: &str) -> Result<Bucket> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        let bucket_owned = bucket.to_string();
        let row = repo
            .with_rls(move |tx| {
                Box::pin(async move {
                    sqlx::query("SELECT id, public, allowed_mime_types, max_file_size, created_at, updated_at FROM buckets WHERE id = $1")
                        .bind(&bucket_owned)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(anyhow::Error::from)
                })
            })
            .await
            .map_err(StorageError::Rls)?;
        match row {
            Some(row) => bucket_from_row(&row),
            None => Err(StorageError::NotFound {
                kind: "bucket",
                id: bucket.to_string(),
            }),
        }
    }

    fn enforce_bucket_policy(&self, bucket: &Bucket, size: u64, mime_type: Option<&str>) -> Result<()> {
        if let Some(limit) = bucket.max_file_size {
            let limit = u64::try_from(limit).unwrap_or(u64::MAX);
            if size > limit {
                return Err(StorageError::PayloadTooLarge { size, limit });
            }
        }
        if !bucket.allowed_mime_types.is_empty()
            && let Some(mime_type) = mime_type
            && !bucket.allowed_mime_types.iter().any(|allowed| allowed == mime_type)
        {
            return Err(StorageError::MimeTypeRejected {
                mime_type: mime_type.to_string(),
                bucket: bucket.id.clone(),
            });
        }
        Ok(())
    }

    async fn upsert_object(
        &self,
        identity: &Identity,
        bucket: &str,
        path: &str,
        size: i64,
        mime_type: Option<&str>,
        owner_id: Option<Uuid>,
    ) -> Result<Object> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        let bucket_owned = bucket.to_string();
        let path_owned = path.to_string();
        let mime_owned = mime_type.map(ToString::to_string);
        let row = repo
            .with_rls(move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO objects (id, bucket_id, path, size, mime_type, metadata, owner_id, created_at, updated_at)
                         VALUES (gen_random_uuid(), $1, $2, $3, $4, '{}'::jsonb, $5, now(), now())
                         ON CONFLICT (bucket_id, path) DO UPDATE SET
                            size = excluded.size,
                            mime_type = excluded.mime_type,
                            updated_at = now()
                         RETURNING id, bucket_id, path, size, mime_type, metadata, owner_id, created_at, updated_at",
                    )
                    .bind(&bucket_owned)
                    .bind(&path_owned)
                    .bind(size)
                    .bind(&mime_owned)
                    .bind(owner_id)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(anyhow::Error::from)
                })
            })
            .await
            .map_err(StorageError::Rls)?;
        object_from_row(&row)
    }

    // ---- chunked upload sessions ------------------------------------

    /// Begin a chunked upload session. Validates `total_size` against the
    /// resolved upload-size limit and `chunk_size` against the 5 MiB
    /// multipart-equivalent minimum (waived when the whole object fits in a
    /// single final part).
    pub async fn init_upload(
        &self,
        identity: &Identity,
        bucket: &str,
        key: &str,
        total_size: i64,
        chunk_size: i64,
        backend_kind: StorageBackendKind,
        opts: ChunkedUploadOptions,
    ) -> Result<ChunkedUploadSession> {
        let max_bytes = self.max_upload_bytes().await?;
        if total_size < 0 || total_size as u64 > max_bytes {
            return Err(StorageError::PayloadTooLarge {
                size: total_size.max(0) as u64,
                limit: max_bytes,
            });
        }
        if chunk_size <= 0 || (chunk_size < MIN_CHUNK_SIZE && total_size > chunk_size) {
            return Err(StorageError::InvalidChunkSize {
                chunk_size,
                minimum: MIN_CHUNK_SIZE,
            });
        }

        let total_chunks = i32::try_from(total_size.div_ceil(chunk_size).max(1)).unwrap_or(i32::MAX);
        let session_id = Uuid::new_v4();
        let multipart_id = self.backend.init_multipart(bucket, key).await?;
        let expires_at = Utc::now() + opts.ttl;
        let owner_id = identity.subject.as_deref().and_then(|subject| Uuid::parse_str(subject).ok());

        let repo = RlsRepository::new(&self.pool, identity.clone());
        let bucket_owned = bucket.to_string();
        let key_owned = key.to_string();
        let multipart_owned = multipart_id.clone();
        repo.with_rls(move |tx| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO chunked_upload_sessions
                        (session_id, bucket, key, total_size, chunk_size, total_chunks,
                         completed_chunks, part_etags, status, expires_at, created_at,
                         owner_id, backend, s3_multipart_id)
                     VALUES ($1, $2, $3, $4, $5, $6, '[]'::jsonb, '{}'::jsonb, 'active',
                             $7, now(), $8, $9, $10)",
                )
                .bind(session_id)
                .bind(&bucket_owned)
                .bind(&key_owned)
                .bind(total_size)
                .bind(chunk_size)
                .bind(total_chunks)
                .bind(expires_at)
                .bind(owner_id)
                .bind(backend_kind.as_str())
                .bind(&multipart_owned)
                .execute(&mut **tx)
                .await
                .map_err(anyhow::Error::from)
            })
        })
        .await
        .map_err(StorageError::Rls)?;

        info!(session_id = %session_id, bucket, key, total_chunks, "chunked upload session created");
        self.metrics.inc_upload_session_outcome("initiated");
        let _ = self.events.publish(Event::UploadSessionChanged {
            session_id,
            state: UploadSessionState::Active,
        });

        Ok(ChunkedUploadSession {
            session_id,
            bucket: bucket.to_string(),
            key: key.to_string(),
            total_size,
            chunk_size,
            total_chunks,
            completed_chunks: Default::default(),
            part_etags: Default::default(),
            status: UploadStatus::Active,
            expires_at,
            created_at: Utc::now(),
            owner_id,
            backend: backend_kind,
            s3_multipart_id: multipart_id,
        })
    }

    /// Upload a single part. Re-uploading the same index overwrites the
    /// stored ETag without increasing `total_chunks`.
    pub async fn upload_chunk(&self, identity: &Identity, session_id: Uuid, index: i32, body: &[u8]) -> Result<ChunkedUploadSession> {
        let session = self.load_session(identity, session_id).await?;
        if session.status != UploadStatus::Active {
            return Err(StorageError::InvalidSessionState {
                session_id,
                status: session.status.as_str(),
                expected: "active",
            });
        }
        if Utc::now() >= session.expires_at {
            self.abort_upload(identity, session_id).await?;
            return Err(StorageError::InvalidSessionState {
                session_id,
                status: "expired",
                expected: "active",
            });
        }
        if index < 0 || index >= session.total_chunks {
            return Err(StorageError::InvalidChunkIndex { session_id, index });
        }

        let etag = self
            .backend
            .write_part(&session.bucket, &session.key, session_id, session.s3_multipart_id.as_deref(), index, body)
            .await?;

        self.record_part(identity, session_id, index, &etag).await
    }

    async fn record_part(&self, identity: &Identity, session_id: Uuid, index: i32, etag: &str) -> Result<ChunkedUploadSession> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        let etag_owned = etag.to_string();
        repo.with_rls(move |tx| {
            Box::pin(async move {
                sqlx::query(
                    "UPDATE chunked_upload_sessions
                     SET completed_chunks = (
                           SELECT jsonb_agg(DISTINCT value)
                           FROM jsonb_array_elements(completed_chunks || to_jsonb($2::int)) AS value
                         ),
                         part_etags = jsonb_set(part_etags, array[$2::text], to_jsonb($3::text))
                     WHERE session_id = $1",
                )
                .bind(session_id)
                .bind(index)
                .bind(&etag_owned)
                .execute(&mut **tx)
                .await
                .map_err(anyhow::Error::from)
            })
        })
        .await
        .map_err(StorageError::Rls)?;
        self.load_session(identity, session_id).await
    }

    /// Finalize a session once every chunk index has landed at least once.
    pub async fn complete_upload(&self, identity: &Identity, session_id: Uuid) -> Result<Object> {
        let session = self.load_session(identity, session_id).await?;
        if session.status != UploadStatus::Active {
            return Err(StorageError::InvalidSessionState {
                session_id,
                status: session.status.as_str(),
                expected: "active",
            });
        }
        if !session.is_complete() {
            return Err(StorageError::IncompleteUpload {
                session_id,
                missing: session.missing_chunks().len(),
            });
        }

        self.set_session_status(identity, session_id, UploadStatus::Completing).await?;

        let mut parts: Vec<PartHandle> = session
            .part_etags
            .iter()
            .map(|(index, etag)| PartHandle { index: *index, etag: etag.clone() })
            .collect();
        parts.sort_by_key(|part| part.index);

        let outcome = self
            .backend
            .complete(&session.bucket, &session.key, session_id, session.s3_multipart_id.as_deref(), &parts)
            .await;

        let size = match outcome {
            Ok(size) => size,
            Err(error) => {
                self.set_session_status(identity, session_id, UploadStatus::Active).await?;
                self.metrics.inc_upload_session_outcome("complete_failed");
                return Err(error);
            }
        };

        let object = self
            .upsert_object(identity, &session.bucket, &session.key, i64::try_from(size).unwrap_or(i64::MAX), None, session.owner_id)
            .await?;

        self.delete_session(identity, session_id).await?;
        self.metrics.inc_upload_session_outcome("completed");
        let _ = self.events.publish(Event::UploadSessionChanged {
            session_id,
            state: UploadSessionState::Completed,
        });
        Ok(object)
    }

    /// Unconditionally discard a session and any parts written for it.
    pub async fn abort_upload(&self, identity: &Identity, session_id: Uuid) -> Result<()> {
        let session = self.load_session(identity, session_id).await?;
        self.backend
            .abort(&session.bucket, &session.key, session_id, session.s3_multipart_id.as_deref())
            .await?;
        self.delete_session(identity, session_id).await?;
        self.metrics.inc_upload_session_outcome("aborted");
        let _ = self.events.publish(Event::UploadSessionChanged {
            session_id,
            state: UploadSessionState::Aborted,
        });
        Ok(())
    }

    /// Current progress of a session.
    pub async fn session_status(&self, identity: &Identity, session_id: Uuid) -> Result<ChunkedUploadSession> {
        self.load_session(identity, session_id).await
    }

    async fn load_session(&self, identity: &Identity, session_id: Uuid) -> Result<ChunkedUploadSession> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        let row = repo
            .with_rls(move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "SELECT session_id, bucket, key, total_size, chunk_size, total_chunks,
                                completed_chunks, part_etags, status, expires_at, created_at,
                                owner_id, backend, s3_multipart_id
                         FROM chunked_upload_sessions WHERE session_id = $1",
                    )
                    .bind(session_id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(anyhow::Error::from)
                })
            })
            .await
            .map_err(StorageError::Rls)?;
        match row {
            Some(row) => session_from_row(&row),
            None => Err(StorageError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            }),
        }
    }

    async fn set_session_status(&self, identity: &Identity, session_id: Uuid, status: UploadStatus) -> Result<()> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        repo.with_rls(move |tx| {
            Box::pin(async move {
                sqlx::query("UPDATE chunked_upload_sessions SET status = $2 WHERE session_id = $1")
                    .bind(session_id)
                    .bind(status.as_str())
                    .execute(&mut **tx)
                    .await
                    .map_err(anyhow::Error::from)
            })
        })
        .await
        .map_err(StorageError::Rls)?;
        Ok(())
    }

    async fn delete_session(&self, identity: &Identity, session_id: Uuid) -> Result<()> {
        let repo = RlsRepository::new(&self.pool, identity.clone());
        repo.with_rls(move |tx| {
            Box::pin(async move {
                sqlx::query("DELETE FROM chunked_upload_sessions WHERE session_id = $1")
                    .bind(session_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(anyhow::Error::from)
            })
        })
        .await
        .map_err(StorageError::Rls)?;
        Ok(())
    }

    /// Abort every session whose `expires_at` has passed. Intended to be
    /// called periodically by a background sweeper, not per-request, so it
    /// runs directly against the pool rather than through an `Identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the expired-session query or any individual
    /// abort's database update fails.
    pub async fn sweep_expired_sessions(&self) -> Result<usize> {
        let rows = sqlx::query(
            "SELECT session_id, bucket, key, backend, s3_multipart_id
             FROM chunked_upload_sessions
             WHERE status = 'active' AND expires_at <= now()",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("sweep_select_expired"))?;

        let mut swept = 0usize;
        for row in &rows {
            let session_id: Uuid = row.try_get("session_id").map_err(db_err("sweep_decode"))?;
            let bucket: String = row.try_get("bucket").map_err(db_err("sweep_decode"))?;
            let key: String = row.try_get("key").map_err(db_err("sweep_decode"))?;
            let multipart_id: Option<String> = row.try_get("s3_multipart_id").map_err(db_err("sweep_decode"))?;

            if let Err(error) = self.backend.abort(&bucket, &key, session_id, multipart_id.as_deref()).await {
                warn!(session_id = %session_id, %error, "failed to abort backend parts for expired session");
            }

            let mut tx: Transaction<'_, Postgres> = self.pool.begin().await.map_err(db_err("sweep_begin"))?;
            sqlx::query("DELETE FROM chunked_upload_sessions WHERE session_id = $1")
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("sweep_delete"))?;
            tx.commit().await.map_err(db_err("sweep_commit"))?;

            swept += 1;
            self.metrics.inc_upload_session_outcome("expired");
            let _ = self.events.publish(Event::UploadSessionChanged {
                session_id,
                state: UploadSessionState::Aborted,
            });
        }

        if swept > 0 {
            info!(swept, "expired chunked upload sessions swept");
        }
        Ok(swept)
    }

    // ---- signed URLs --------------------------------------------------

    /// Issue a signed URL for `method` access to `bucket`/`key`, using the
    /// backend's native presigning when available and falling back to the
    /// HMAC token format otherwise.
    pub async fn issue_signed_url(&self, bucket: &str, key: &str, method: &str) -> Result<String> {
        let ttl = self.signed_url_ttl().await?;
        if let Some(url) = self.backend.presign(bucket, key, method, ttl).await? {
            return Ok(url);
        }
        let secret = self.signing_secret().await?;
        let expires_at = Utc::now() + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::hours(1));
        Ok(signed_url::generate(&secret, bucket, key, method, expires_at))
    }

    /// Validate a signed-URL token presented for `request_method` from
    /// `client_ip`, enforcing both the HMAC/expiry check and the per-IP rate
    /// limit.
    pub async fn authorize_signed_request(&self, token: &str, request_method: &str, client_ip: IpAddr) -> Result<(String, String)> {
        let rate_limit = self.signed_url_rate_limit().await?;
        if let Err(retry_after) = self.rate_limiter.check(client_ip, &rate_limit) {
            self.metrics.inc_rate_limit_throttled();
            return Err(StorageError::RateLimited {
                retry_after_secs: retry_after.as_secs(),
            });
        }

        let secret = self.signing_secret().await?;
        let validated = match signed_url::validate(&secret, token) {
            Ok(token) => token,
            Err(error) => {
                self.metrics.inc_signed_url_validation("rejected");
                let _ = self.events.publish(Event::SignedUrlRejected {
                    reason: error.to_string(),
                });
                return Err(error);
            }
        };

        if validated.method != request_method {
            self.metrics.inc_signed_url_validation("rejected");
            let _ = self.events.publish(Event::SignedUrlRejected {
                reason: "method_mismatch".to_string(),
            });
            return Err(StorageError::SignedUrlMethodMismatch {
                method: request_method.to_string(),
            });
        }

        self.metrics.inc_signed_url_validation("accepted");
        Ok((validated.bucket, validated.key))
    }
}

fn bucket_from_row(row: &sqlx::postgres::PgRow) -> Result<Bucket> {
    Ok(Bucket {
        id: row.try_get("id").map_err(db_err("decode_bucket"))?,
        public: row.try_get("public").map_err(db_err("decode_bucket"))?,
        allowed_mime_types: row.try_get("allowed_mime_types").map_err(db_err("decode_bucket"))?,
        max_file_size: row.try_get("max_file_size").map_err(db_err("decode_bucket"))?,
        created_at: row.try_get("created_at").map_err(db_err("decode_bucket"))?,
        updated_at: row.try_get("updated_at").map_err(db_err("decode_bucket"))?,
    })
}

fn object_from_row(row: &sqlx::postgres::PgRow) -> Result<Object> {
    Ok(Object {
        id: row.try_get("id").map_err(db_err("decode_object"))?,
        bucket_id: row.try_get("bucket_id").map_err(db_err("decode_object"))?,
        path: row.try_get("path").map_err(db_err("decode_object"))?,
        size: row.try_get("size").map_err(db_err("decode_object"))?,
        mime_type: row.try_get("mime_type").map_err(db_err("decode_object"))?,
        metadata: row.try_get("metadata").map_err(db_err("decode_object"))?,
        owner_id: row.try_get("owner_id").map_err(db_err("decode_object"))?,
        created_at: row.try_get("created_at").map_err(db_err("decode_object"))?,
        updated_at: row.try_get("updated_at").map_err(db_err("decode_object"))?,
    })
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<ChunkedUploadSession> {
    let status_raw: String = row.try_get("status").map_err(db_err("decode_session"))?;
    let backend_raw: String = row.try_get("backend").map_err(db_err("decode_session"))?;
    let completed_raw: serde_json::Value = row.try_get("completed_chunks").map_err(db_err("decode_session"))?;
    let etags_raw: serde_json::Value = row.try_get("part_etags").map_err(db_err("decode_session"))?;

    let completed_chunks = completed_raw
        .as_array()
        .map(|values| values.iter().filter_map(serde_json::Value::as_i64).map(|value| value as i32).collect())
        .unwrap_or_default();
    let part_etags = etags_raw
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| {
                    let index: i32 = key.parse().ok()?;
                    let etag = value.as_str()?.to_string();
                    Some((index, etag))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChunkedUploadSession {
        session_id: row.try_get("session_id").map_err(db_err("decode_session"))?,
        bucket: row.try_get("bucket").map_err(db_err("decode_session"))?,
        key: row.try_get("key").map_err(db_err("decode_session"))?,
        total_size: row.try_get("total_size").map_err(db_err("decode_session"))?,
        chunk_size: row.try_get("chunk_size").map_err(db_err("decode_session"))?,
        total_chunks: row.try_get("total_chunks").map_err(db_err("decode_session"))?,
        completed_chunks,
        part_etags,
        status: UploadStatus::parse(&status_raw).unwrap_or(UploadStatus::Active),
        expires_at: row.try_get("expires_at").map_err(db_err("decode_session"))?,
        created_at: row.try_get("created_at").map_err(db_err("decode_session"))?,
        owner_id: row.try_get("owner_id").map_err(db_err("decode_session"))?,
        backend: StorageBackendKind::parse(&backend_raw).unwrap_or(StorageBackendKind::Local),
        s3_multipart_id: row.try_get("s3_multipart_id").map_err(db_err("decode_session"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_chunk_size_matches_multipart_floor() {
        assert_eq!(MIN_CHUNK_SIZE, 5 * 1024 * 1024);
    }
}
