#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::multiple_crate_versions)]

//! Bucket/object metadata, the chunked upload state machine, and signed-URL
//! issuance/validation for local and S3-compatible backends.
//!
//! Layout: `model.rs` (domain types), `error.rs` (error types), `backend/`
//! (pluggable byte storage), `rate_limit.rs` (IP-keyed token bucket),
//! `signed_url.rs` (HMAC token format), `service.rs` (orchestration).

pub mod backend;
pub mod error;
pub mod model;
pub mod rate_limit;
pub mod service;
pub mod signed_url;

pub use backend::{LocalBackend, PartHandle, S3Backend, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use model::{
    Bucket, ChunkedUploadOptions, ChunkedUploadSession, Object, ObjectPermission, Permission,
    SignedToken, StorageBackendKind, UploadStatus,
};
pub use rate_limit::IpRateLimiter;
pub use service::StorageService;
