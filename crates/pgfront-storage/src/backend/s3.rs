//! S3-compatible storage backend, built on `aws-sdk-s3`.
//!
//! Multipart state (the provider's upload id and each part's ETag) is the
//! backend's own source of truth for in-flight assembly; the
//! `chunked_upload_sessions` table additionally mirrors it so `complete` can
//! reconcile against stored ETags even if the process restarted between
//! parts.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};

use super::{PartHandle, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::model::StorageBackendKind;

fn s3_err<E: std::fmt::Debug>(operation: &'static str) -> impl Fn(E) -> StorageError {
    move |source| StorageError::S3 {
        operation,
        detail: format!("{source:?}"),
    }
}

/// Thin wrapper around an `aws_sdk_s3::Client` bound to a single endpoint.
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    /// Wrap an already-configured SDK client (region, endpoint, and
    /// credentials are resolved by the caller via `aws-config`).
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::S3
    }

    async fn init_multipart(&self, bucket: &str, key: &str) -> StorageResult<Option<String>> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_err("create_multipart_upload"))?;
        Ok(output.upload_id().map(ToString::to_string))
    }

    async fn write_part(
        &self,
        bucket: &str,
        key: &str,
        _session_id: uuid::Uuid,
        multipart_id: Option<&str>,
        index: i32,
        body: &[u8],
    ) -> StorageResult<String> {
        let upload_id = multipart_id.ok_or(StorageError::S3 {
            operation: "write_part",
            detail: "missing multipart upload id".to_string(),
        })?;
        // S3 part numbers are 1-indexed; our session indices are 0-indexed.
        let part_number = index + 1;
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(s3_err("upload_part"))?;
        output.e_tag().map(ToString::to_string).ok_or(StorageError::S3 {
            operation: "upload_part",
            detail: "response carried no ETag".to_string(),
        })
    }

    async fn complete(
        &self,
        bucket: &str,
        key: &str,
        _session_id: uuid::Uuid,
        multipart_id: Option<&str>,
        parts: &[PartHandle],
    ) -> StorageResult<u64> {
        let upload_id = multipart_id.ok_or(StorageError::S3 {
            operation: "complete",
            detail: "missing multipart upload id".to_string(),
        })?;

        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.index + 1)
                    .e_tag(part.etag.clone())
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed_parts)).build())
            .send()
            .await
            .map_err(s3_err("complete_multipart_upload"))?;

        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_err("head_object"))?;
        Ok(u64::try_from(head.content_length().unwrap_or_default()).unwrap_or_default())
    }

    async fn abort(&self, bucket: &str, key: &str, _session_id: uuid::Uuid, multipart_id: Option<&str>) -> StorageResult<()> {
        let Some(upload_id) = multipart_id else {
            return Ok(());
        };
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(s3_err("abort_multipart_upload"))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_err("get_object"))?;
        let bytes = output.body.collect().await.map_err(s3_err("get_object.collect"))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(s3_err("put_object"))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_err("delete_object"))?;
        Ok(())
    }

    async fn presign(&self, bucket: &str, key: &str, method: &str, ttl: std::time::Duration) -> StorageResult<Option<String>> {
        let config = PresigningConfig::expires_in(ttl).map_err(s3_err("presigning_config"))?;
        let request = match method {
            "GET" => self.client.get_object().bucket(bucket).key(key).presigned(config).await,
            "PUT" => self.client.put_object().bucket(bucket).key(key).presigned(config).await,
            other => {
                return Err(StorageError::S3 {
                    operation: "presign",
                    detail: format!("unsupported method '{other}' for presigning"),
                });
            }
        };
        let presigned = request.map_err(s3_err("presign"))?;
        Ok(Some(presigned.uri().to_string()))
    }
}
