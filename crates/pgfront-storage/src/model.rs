//! Domain models for bucket/object metadata, chunked upload sessions, and
//! signed-URL tokens.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named storage bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    /// Bucket identifier (also its routable slug, e.g. `/storage/buckets/{id}`).
    pub id: String,
    /// Whether objects in this bucket are readable without a signed URL.
    pub public: bool,
    /// Allowed MIME types; empty means unrestricted.
    pub allowed_mime_types: Vec<String>,
    /// Maximum size, in bytes, for a single object. `None` means unrestricted.
    pub max_file_size: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A stored object within a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    /// Surrogate identifier, referenced by [`ObjectPermission`].
    pub id: Uuid,
    /// Owning bucket.
    pub bucket_id: String,
    /// Path within the bucket. Unique together with `bucket_id`.
    pub path: String,
    /// Size in bytes.
    pub size: i64,
    /// MIME type, if known.
    pub mime_type: Option<String>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: serde_json::Value,
    /// Identity that created the object, if authenticated.
    pub owner_id: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A grant of `read` or `write` access to a specific user over an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// May read (download) the object.
    Read,
    /// May overwrite or delete the object.
    Write,
}

impl Permission {
    /// Parse the value stored in the `permission` column.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            _ => None,
        }
    }

    /// The literal stored in the `permission` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Row granting `permission` over `object_id` to `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectPermission {
    /// Object the grant applies to.
    pub object_id: Uuid,
    /// User receiving the grant.
    pub user_id: Uuid,
    /// Granted permission.
    pub permission: Permission,
}

/// Storage backend a chunked upload session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Parts are assembled on local disk.
    Local,
    /// Parts are uploaded via an S3-compatible multipart upload.
    S3,
}

impl StorageBackendKind {
    /// Parse the value stored in the `backend` column.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "local" => Some(Self::Local),
            "s3" => Some(Self::S3),
            _ => None,
        }
    }

    /// The literal stored in the `backend` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
        }
    }
}

/// Lifecycle state of a [`ChunkedUploadSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Accepting part uploads.
    Active,
    /// Finalization in progress; transient.
    Completing,
    /// Finalized successfully; immutable, retained only for audit.
    Completed,
    /// Aborted by the client or the expiry sweeper; immutable.
    Aborted,
}

impl UploadStatus {
    /// Parse the value stored in the `status` column.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "completing" => Some(Self::Completing),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    /// The literal stored in the `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// Server-side record tracking a multi-request chunked upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkedUploadSession {
    /// Session identifier, supplied by the client on every subsequent call.
    pub session_id: Uuid,
    /// Destination bucket.
    pub bucket: String,
    /// Destination object path.
    pub key: String,
    /// Total object size, in bytes, declared at `init`.
    pub total_size: i64,
    /// Size of each part except possibly the last.
    pub chunk_size: i64,
    /// `ceil(total_size / chunk_size)`.
    pub total_chunks: i32,
    /// Indices for which a part has been received at least once.
    pub completed_chunks: BTreeSet<i32>,
    /// ETag (or local checksum) recorded for each completed index.
    pub part_etags: BTreeMap<i32, String>,
    /// Current lifecycle state.
    pub status: UploadStatus,
    /// Absolute expiry; the sweeper aborts sessions past this point.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Identity that owns the session; only it may mutate the session.
    pub owner_id: Option<Uuid>,
    /// Backend the session was created against.
    pub backend: StorageBackendKind,
    /// S3 multipart upload id, present only for `backend = s3`.
    pub s3_multipart_id: Option<String>,
}

impl ChunkedUploadSession {
    /// Indices not yet covered by `completed_chunks`.
    #[must_use]
    pub fn missing_chunks(&self) -> Vec<i32> {
        (0..self.total_chunks)
            .filter(|index| !self.completed_chunks.contains(index))
            .collect()
    }

    /// `true` once every index in `0..total_chunks` has been uploaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_chunks.len() == usize::try_from(self.total_chunks).unwrap_or(usize::MAX)
    }
}

/// Options accepted by [`init_upload`](crate::service::StorageService::init_upload).
#[derive(Debug, Clone, Copy)]
pub struct ChunkedUploadOptions {
    /// Time-to-live for the session before the sweeper aborts it.
    pub ttl: chrono::Duration,
}

/// Length, in bytes, of a signed-URL nonce.
pub const NONCE_LEN: usize = 16;

/// Parsed, HMAC-verified signed-URL token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    /// Target bucket.
    pub bucket: String,
    /// Target object path.
    pub key: String,
    /// HTTP method the token authorizes (uppercase, e.g. `"GET"`).
    pub method: String,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
    /// Random per-token nonce, preventing MAC reuse across otherwise
    /// identical bucket/key/method/expiry tuples.
    pub nonce: [u8; NONCE_LEN],
}
