//! Local-filesystem storage backend.
//!
//! Parts are written under `<root>/.pgfront/<session_id>/<index>.part`
//! alongside a `session.json` sidecar recording which indices have landed —
//! the same sidecar-recovery convention used for completed-torrent
//! post-processing jobs, generalized from a single metadata document per job
//! to a per-session parts ledger. On `complete`, parts are concatenated in
//! index order into `<root>/<bucket>/<key>`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{PartHandle, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::model::StorageBackendKind;

const META_DIR_NAME: &str = ".pgfront";
const SESSION_META_FILE: &str = "session.json";

fn io_err(operation: &'static str) -> impl FnOnce(std::io::Error) -> StorageError {
    move |source| StorageError::Io { operation, source }
}

/// Sidecar ledger of parts written for a session, read back on restart so a
/// completed backend operation survives a process crash mid-upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionLedger {
    parts: BTreeMap<i32, String>,
}

/// Stores objects and in-progress chunked upload parts under a single root
/// directory on local disk.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Root directory objects and session parts are stored under.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    fn session_dir(&self, bucket: &str, session_id: Uuid) -> PathBuf {
        self.root.join(bucket).join(META_DIR_NAME).join(session_id.to_string())
    }

    fn part_path(&self, bucket: &str, session_id: Uuid, index: i32) -> PathBuf {
        self.session_dir(bucket, session_id).join(format!("{index}.part"))
    }

    fn ledger_path(&self, bucket: &str, session_id: Uuid) -> PathBuf {
        self.session_dir(bucket, session_id).join(SESSION_META_FILE)
    }

    async fn load_ledger(&self, bucket: &str, session_id: Uuid) -> StorageResult<SessionLedger> {
        let path = self.ledger_path(bucket, session_id);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StorageError::Io {
                operation: "load_session_ledger",
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(SessionLedger::default()),
            Err(source) => Err(StorageError::Io {
                operation: "load_session_ledger",
                source,
            }),
        }
    }

    async fn persist_ledger(&self, bucket: &str, session_id: Uuid, ledger: &SessionLedger) -> StorageResult<()> {
        let path = self.ledger_path(bucket, session_id);
        let body = serde_json::to_vec_pretty(ledger).expect("ledger serializes");
        fs::write(&path, body).await.map_err(io_err("persist_session_ledger"))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::Local
    }

    async fn init_multipart(&self, bucket: &str, _key: &str) -> StorageResult<Option<String>> {
        let dir = self.root.join(bucket).join(META_DIR_NAME);
        fs::create_dir_all(&dir).await.map_err(io_err("init_multipart"))?;
        Ok(None)
    }

    async fn write_part(
        &self,
        bucket: &str,
        _key: &str,
        session_id: Uuid,
        _multipart_id: Option<&str>,
        index: i32,
        body: &[u8],
    ) -> StorageResult<String> {
        let dir = self.session_dir(bucket, session_id);
        fs::create_dir_all(&dir).await.map_err(io_err("write_part.prepare_dir"))?;

        let checksum = checksum_hex(body);
        let path = self.part_path(bucket, session_id, index);
        let mut file = fs::File::create(&path).await.map_err(io_err("write_part.create"))?;
        file.write_all(body).await.map_err(io_err("write_part.write"))?;
        file.flush().await.map_err(io_err("write_part.flush"))?;

        let mut ledger = self.load_ledger(bucket, session_id).await?;
        ledger.parts.insert(index, checksum.clone());
        self.persist_ledger(bucket, session_id, &ledger).await?;

        Ok(checksum)
    }

    async fn complete(
        &self,
        bucket: &str,
        key: &str,
        session_id: Uuid,
        _multipart_id: Option<&str>,
        parts: &[PartHandle],
    ) -> StorageResult<u64> {
        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(io_err("complete.prepare_dest"))?;
        }

        let mut out = fs::File::create(&dest).await.map_err(io_err("complete.create_dest"))?;
        let mut total: u64 = 0;
        for part in parts {
            let part_path = self.part_path(bucket, session_id, part.index);
            let bytes = fs::read(&part_path).await.map_err(io_err("complete.read_part"))?;
            total += u64::try_from(bytes.len()).unwrap_or(u64::MAX);
            out.write_all(&bytes).await.map_err(io_err("complete.write_dest"))?;
        }
        out.flush().await.map_err(io_err("complete.flush"))?;

        let session_dir = self.session_dir(bucket, session_id);
        let _ = fs::remove_dir_all(&session_dir).await;
        Ok(total)
    }

    async fn abort(&self, bucket: &str, _key: &str, session_id: Uuid, _multipart_id: Option<&str>) -> StorageResult<()> {
        let session_dir = self.session_dir(bucket, session_id);
        match fs::remove_dir_all(&session_dir).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        fs::read(self.object_path(bucket, key)).await.map_err(io_err("get_object"))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> StorageResult<()> {
        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(io_err("put_object.prepare_dest"))?;
        }
        fs::write(&dest, body).await.map_err(io_err("put_object"))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.object_path(bucket, key)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                operation: "delete_object",
                source,
            }),
        }
    }

    async fn presign(&self, _bucket: &str, _key: &str, _method: &str, _ttl: std::time::Duration) -> StorageResult<Option<String>> {
        Ok(None)
    }
}

fn checksum_hex(body: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(body);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_parts_then_completes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let session_id = Uuid::new_v4();

        backend.init_multipart("pics", "a/b.bin").await.unwrap();
        let etag0 = backend.write_part("pics", "a/b.bin", session_id, None, 0, b"hello ").await.unwrap();
        let etag1 = backend.write_part("pics", "a/b.bin", session_id, None, 1, b"world").await.unwrap();
        assert_ne!(etag0, etag1);

        let size = backend
            .complete(
                "pics",
                "a/b.bin",
                session_id,
                None,
                &[
                    PartHandle { index: 0, etag: etag0 },
                    PartHandle { index: 1, etag: etag1 },
                ],
            )
            .await
            .unwrap();
        assert_eq!(size, 11);

        let bytes = backend.get_object("pics", "a/b.bin").await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn abort_removes_in_progress_parts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let session_id = Uuid::new_v4();

        backend.write_part("pics", "a/b.bin", session_id, None, 0, b"partial").await.unwrap();
        backend.abort("pics", "a/b.bin", session_id, None).await.unwrap();

        let ledger = backend.load_ledger("pics", session_id).await.unwrap();
        assert!(ledger.parts.is_empty());
    }
}
