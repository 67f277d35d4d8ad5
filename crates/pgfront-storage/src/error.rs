//! Error types for bucket/object storage, chunked uploads, and signed URLs.

use std::io;

use thiserror::Error;

/// Result type used throughout this crate.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by the storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No bucket, object, or session with the given identifier exists.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of resource was missing (`bucket`, `object`, `session`).
        kind: &'static str,
        /// The identifier that was not found.
        id: String,
    },
    /// A unique-constraint violation (duplicate bucket, duplicate object path).
    #[error("conflict creating {kind}: {id}")]
    Conflict {
        /// What kind of resource conflicted.
        kind: &'static str,
        /// The identifier that already existed.
        id: String,
    },
    /// The object would exceed the bucket's `maxFileSize` or the resolved
    /// instance-wide upload limit.
    #[error("payload of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: u64,
        /// The limit that was exceeded.
        limit: u64,
    },
    /// `chunkSize` was non-positive, or below the 5 MiB multipart floor
    /// without qualifying for the single-final-part exemption.
    #[error("chunk size {chunk_size} is invalid (minimum {minimum} bytes unless the upload fits in one part)")]
    InvalidChunkSize {
        /// The rejected chunk size.
        chunk_size: i64,
        /// The floor it was required to meet.
        minimum: i64,
    },
    /// A MIME type not present in the bucket's `allowedMimeTypes`.
    #[error("mime type '{mime_type}' is not allowed in bucket '{bucket}'")]
    MimeTypeRejected {
        /// Offending MIME type.
        mime_type: String,
        /// Bucket that rejected it.
        bucket: String,
    },
    /// A chunked upload operation was attempted in a state that forbids it
    /// (e.g. uploading a part to a `completed` session).
    #[error("chunked upload session {session_id} is {status}, expected {expected}")]
    InvalidSessionState {
        /// Affected session.
        session_id: uuid::Uuid,
        /// Actual status.
        status: &'static str,
        /// Status the operation required.
        expected: &'static str,
    },
    /// `complete` was called before every chunk index had been uploaded.
    #[error("chunked upload session {session_id} is missing {missing} chunk(s)")]
    IncompleteUpload {
        /// Affected session.
        session_id: uuid::Uuid,
        /// Number of chunk indices still outstanding.
        missing: usize,
    },
    /// A part index outside `0..totalChunks`, or a part for the wrong bucket.
    #[error("invalid chunk index {index} for session {session_id}")]
    InvalidChunkIndex {
        /// Affected session.
        session_id: uuid::Uuid,
        /// Offending index.
        index: i32,
    },
    /// A signed-URL token that failed its expiry check.
    #[error("signed URL token has expired")]
    SignedUrlExpired,
    /// A signed-URL token whose MAC did not verify.
    #[error("signed URL token has an invalid signature")]
    SignedUrlBadMac,
    /// A signed-URL token that could not be decoded into its component
    /// fields at all.
    #[error("signed URL token is malformed")]
    SignedUrlMalformed,
    /// A signed-URL token presented for a different HTTP method than the one
    /// it was issued for.
    #[error("signed URL token does not authorize method '{method}'")]
    SignedUrlMethodMismatch {
        /// Method the request actually used.
        method: String,
    },
    /// The caller has exceeded the IP-bucket rate limit.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },
    /// IO failure talking to the local backend.
    #[error("storage io failure during '{operation}'")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Failure talking to the S3-compatible backend.
    #[error("s3 backend failure during '{operation}'")]
    S3 {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Human-readable detail extracted from the SDK error.
        detail: String,
    },
    /// A database operation against `buckets`/`objects`/
    /// `chunked_upload_sessions` failed.
    #[error("database operation '{operation}' failed")]
    Database {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },
    /// A settings/secrets resolver call failed.
    #[error("config resolver operation failed")]
    Config(#[from] pgfront_config::ConfigError),
    /// An RLS-scoped data access failed.
    #[error("data access operation failed")]
    Data(#[from] pgfront_data::DataError),
    /// A bucket/object/session query run through `RlsRepository::with_rls`
    /// failed, either opening the transaction or inside the closure itself.
    #[error("rls-scoped storage operation failed")]
    Rls(#[source] anyhow::Error),
}
