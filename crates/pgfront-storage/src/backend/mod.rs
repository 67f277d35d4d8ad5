//! Storage backends: local filesystem and S3-compatible multipart uploads.

pub mod local;
pub mod s3;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::model::StorageBackendKind;

pub use local::LocalBackend;
pub use s3::S3Backend;

/// A single uploaded part, ready to be handed to [`StorageBackend::complete`].
#[derive(Debug, Clone)]
pub struct PartHandle {
    /// Part index, `0..totalChunks`.
    pub index: i32,
    /// ETag (S3) or content checksum (local) recorded for the part.
    pub etag: String,
}

/// Operations a chunked-upload-capable object store must provide.
///
/// Bucket/object *metadata* lives in Postgres regardless of backend; this
/// trait only covers the movement of bytes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which [`StorageBackendKind`] this implementation is.
    fn kind(&self) -> StorageBackendKind;

    /// Begin a multipart upload. Returns the provider-assigned multipart id,
    /// or `None` for backends (like local) that don't need one.
    async fn init_multipart(&self, bucket: &str, key: &str) -> StorageResult<Option<String>>;

    /// Write a single part's bytes, returning its ETag/checksum.
    async fn write_part(
        &self,
        bucket: &str,
        key: &str,
        session_id: uuid::Uuid,
        multipart_id: Option<&str>,
        index: i32,
        body: &[u8],
    ) -> StorageResult<String>;

    /// Assemble `parts` (already ordered by index) into the final object,
    /// returning its total size in bytes.
    async fn complete(
        &self,
        bucket: &str,
        key: &str,
        session_id: uuid::Uuid,
        multipart_id: Option<&str>,
        parts: &[PartHandle],
    ) -> StorageResult<u64>;

    /// Discard any parts written so far for `session_id`.
    async fn abort(&self, bucket: &str, key: &str, session_id: uuid::Uuid, multipart_id: Option<&str>) -> StorageResult<()>;

    /// Read a complete object's bytes.
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Write a complete object's bytes in one call (non-chunked uploads).
    async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> StorageResult<()>;

    /// Delete a complete object.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Issue a provider-native presigned URL, if the backend supports one
    /// (S3 only). Local backends return `None`, leaving HMAC signing to
    /// [`crate::signed_url`].
    async fn presign(&self, bucket: &str, key: &str, method: &str, ttl: std::time::Duration) -> StorageResult<Option<String>>;
}
