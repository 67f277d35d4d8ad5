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
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Shared HTTP DTOs for the data-plane and admin surfaces.
//!
//! These types are reused by the CLI for request/response encoding to keep
//! the wire contract a single source of truth. The conversions live close
//! to the server so the mapping from domain objects (catalog descriptors,
//! storage sessions, settings rows) remains in one place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use pgfront_config::{SecretMetadata, Setting};
use pgfront_introspect::{Catalog, ColumnDescriptor, FunctionDescriptor, ParameterDescriptor, TableDescriptor};
use pgfront_storage::model::{Bucket, ChunkedUploadSession, Object, UploadStatus};

/// RFC9457-compatible problem document surfaced on validation/runtime errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Parameters that failed validation, if applicable.
    pub invalid_params: Option<Vec<ProblemInvalidParam>>,
}

/// Invalid parameter pointer surfaced alongside a [`ProblemDetails`] payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemInvalidParam {
    /// JSON Pointer to the offending field.
    pub pointer: String,
    /// Human-readable description of the validation failure.
    pub message: String,
}

/// Client preferences parsed from the `Prefer` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences {
    /// Response representation preference.
    pub return_kind: ReturnPreference,
    /// Conflict-resolution preference for batch upserts.
    pub resolution: Option<ResolutionPreference>,
    /// Whether columns absent from an input record should be nulled out
    /// on conflict, per `missing=default`.
    pub missing_default: bool,
}

/// `Prefer: return=` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnPreference {
    /// `return=minimal` — no body, only an affected-row count header.
    Minimal,
    /// `return=headers-only` — no body, `Content-Range`/count headers.
    HeadersOnly,
    /// `return=representation`, or the unspecified default — JSON body of
    /// the rows affected.
    #[default]
    Representation,
}

impl ReturnPreference {
    /// Parse a single `return=` token.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "minimal" => Some(Self::Minimal),
            "headers-only" => Some(Self::HeadersOnly),
            "representation" => Some(Self::Representation),
            _ => None,
        }
    }
}

/// `Prefer: resolution=` value, controlling `ON CONFLICT` behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPreference {
    /// `resolution=merge-duplicates` — `ON CONFLICT (...) DO UPDATE`.
    MergeDuplicates,
    /// `resolution=ignore-duplicates` — `ON CONFLICT (...) DO NOTHING`.
    IgnoreDuplicates,
}

impl ResolutionPreference {
    /// Parse a single `resolution=` token.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "merge-duplicates" => Some(Self::MergeDuplicates),
            "ignore-duplicates" => Some(Self::IgnoreDuplicates),
            _ => None,
        }
    }
}

impl Preferences {
    /// Parse the comma-separated tokens of a `Prefer` header value.
    ///
    /// Unrecognized tokens are ignored rather than rejected, matching
    /// PostgREST's own tolerant parsing of this header.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut preferences = Self::default();
        for token in raw.split(',').map(str::trim) {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key.trim() {
                "return" => {
                    if let Some(parsed) = ReturnPreference::parse(value.trim()) {
                        preferences.return_kind = parsed;
                    }
                }
                "resolution" => {
                    preferences.resolution = ResolutionPreference::parse(value.trim());
                }
                "missing" if value.trim() == "default" => preferences.missing_default = true,
                _ => {}
            }
        }
        preferences
    }
}

/// Row count reported via `Content-Range` when `count=` was requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentRange {
    /// First row index of the returned page (inclusive, 0-based).
    pub start: i64,
    /// Last row index of the returned page (inclusive, 0-based).
    pub end: i64,
    /// Total row count, when known.
    pub total: Option<i64>,
}

impl ContentRange {
    /// Render the `Content-Range: <start>-<end>/<total|*>` header value.
    #[must_use]
    pub fn to_header_value(self) -> String {
        let total = self.total.map_or_else(|| "*".to_string(), |value| value.to_string());
        format!("{}-{}/{total}", self.start, self.end)
    }
}

/// View of a [`ColumnDescriptor`] surfaced via the schema introspection API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnView {
    /// Column name.
    pub name: String,
    /// Postgres type name.
    #[serde(rename = "type")]
    pub pg_type: String,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
    /// Whether the column has a default expression.
    pub has_default: bool,
    /// Whether the column is primary-key-bearing.
    pub is_primary_key: bool,
}

impl ColumnView {
    fn from_descriptor(column: &ColumnDescriptor, primary_key: &[String]) -> Self {
        Self {
            name: column.name.clone(),
            pg_type: column.pg_type.clone(),
            nullable: column.nullable,
            has_default: column.has_default,
            is_primary_key: primary_key.iter().any(|key| key == &column.name),
        }
    }
}

/// View of a [`TableDescriptor`] surfaced via `GET /.well-known/pgfront.json`
/// and the admin schema-introspection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableView {
    /// Schema the relation lives in.
    pub schema: String,
    /// Relation name.
    pub name: String,
    /// Columns, in ordinal position order.
    pub columns: Vec<ColumnView>,
    /// Primary key column names.
    pub primary_key: Vec<String>,
    /// `true` for views.
    pub is_view: bool,
    /// Whether row-level security is enabled.
    pub rls_enabled: bool,
}

impl From<&TableDescriptor> for TableView {
    fn from(table: &TableDescriptor) -> Self {
        Self {
            schema: table.schema.clone(),
            name: table.name.clone(),
            columns: table
                .columns
                .iter()
                .map(|column| ColumnView::from_descriptor(column, &table.primary_key))
                .collect(),
            primary_key: table.primary_key.clone(),
            is_view: table.is_view,
            rls_enabled: table.rls_enabled,
        }
    }
}

/// View of a single [`ParameterDescriptor`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterView {
    /// Parameter name, empty for unnamed positional parameters.
    pub name: String,
    /// Postgres type name.
    #[serde(rename = "type")]
    pub pg_type: String,
    /// Whether the parameter has a default value.
    pub has_default: bool,
}

impl From<&ParameterDescriptor> for ParameterView {
    fn from(parameter: &ParameterDescriptor) -> Self {
        Self {
            name: parameter.name.clone(),
            pg_type: parameter.pg_type.clone(),
            has_default: parameter.has_default,
        }
    }
}

/// View of a [`FunctionDescriptor`] surfaced via the schema introspection
/// API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionView {
    /// Schema the function lives in.
    pub schema: String,
    /// Function name.
    pub name: String,
    /// Declared input/output parameters, in call order.
    pub parameters: Vec<ParameterView>,
    /// Postgres type name of the return value.
    pub return_type: String,
    /// `true` for `RETURNS SETOF`/table functions.
    pub returns_set: bool,
}

impl From<&FunctionDescriptor> for FunctionView {
    fn from(function: &FunctionDescriptor) -> Self {
        Self {
            schema: function.schema.clone(),
            name: function.name.clone(),
            parameters: function.parameters.iter().map(ParameterView::from).collect(),
            return_type: function.return_type.clone(),
            returns_set: function.returns_set,
        }
    }
}

/// Response body for `GET /.well-known/pgfront.json`: a machine-readable
/// description of the currently exposed data-plane surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogView {
    /// Monotonic catalog version this view was rendered from.
    pub version: i64,
    /// Publicly exposed tables and views.
    pub tables: Vec<TableView>,
    /// Publicly exposed functions.
    pub functions: Vec<FunctionView>,
}

impl From<&Catalog> for CatalogView {
    fn from(catalog: &Catalog) -> Self {
        Self {
            version: catalog.version,
            tables: catalog.tables.iter().map(TableView::from).collect(),
            functions: catalog
                .functions
                .iter()
                .filter(|function| function.is_public)
                .map(FunctionView::from)
                .collect(),
        }
    }
}

/// Request body for `POST /rpc/{name}`: an arbitrary JSON object whose
/// keys are matched against parameter names, falling back to positional
/// `argN` binding for keys that don't match a declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RpcRequest {
    /// Named arguments keyed by parameter name or `argN` fallback.
    #[serde(flatten)]
    pub arguments: HashMap<String, Value>,
}

/// Response body for a scalar (non-set-returning) RPC call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcScalarResponse {
    /// The single returned value.
    pub result: Value,
}

/// View of a [`Bucket`] returned by the storage admin endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketView {
    /// Bucket identifier.
    pub id: String,
    /// Whether objects in the bucket are publicly downloadable without a
    /// signed URL.
    pub public: bool,
    /// Allowed MIME type prefixes/exact values; empty means unrestricted.
    pub allowed_mime_types: Vec<String>,
    /// Optional per-object size cap in bytes.
    pub max_file_size: Option<i64>,
}

impl From<&Bucket> for BucketView {
    fn from(bucket: &Bucket) -> Self {
        Self {
            id: bucket.id.clone(),
            public: bucket.public,
            allowed_mime_types: bucket.allowed_mime_types.clone(),
            max_file_size: bucket.max_file_size,
        }
    }
}

/// Request body for `POST /storage/buckets`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketCreateRequest {
    /// Bucket identifier to create.
    pub id: String,
    /// Whether the bucket should allow public downloads.
    #[serde(default)]
    pub public: bool,
    /// Allowed MIME type prefixes/exact values.
    #[serde(default)]
    pub allowed_mime_types: Vec<String>,
    /// Optional per-object size cap in bytes.
    #[serde(default)]
    pub max_file_size: Option<i64>,
}

/// View of an [`Object`] returned by the storage endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectView {
    /// Owning bucket identifier.
    pub bucket_id: String,
    /// Object path within the bucket.
    pub path: String,
    /// Size in bytes.
    pub size: i64,
    /// Declared MIME type, if known.
    pub mime_type: Option<String>,
    /// Owning user id, if the object was uploaded by an authenticated
    /// caller.
    pub owner_id: Option<Uuid>,
}

impl From<&Object> for ObjectView {
    fn from(object: &Object) -> Self {
        Self {
            bucket_id: object.bucket_id.clone(),
            path: object.path.clone(),
            size: object.size,
            mime_type: object.mime_type.clone(),
            owner_id: object.owner_id,
        }
    }
}

/// Request body for `POST /storage/{bucket}/chunked/init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkedUploadInitRequest {
    /// Destination object path within the bucket.
    pub path: String,
    /// Total upload size in bytes.
    pub total_size: i64,
    /// Chunk size in bytes.
    pub chunk_size: i64,
}

/// Response body returned from init/status endpoints for a chunked upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkedUploadSessionView {
    /// Session identifier to reference in subsequent part uploads.
    pub session_id: Uuid,
    /// Owning bucket.
    pub bucket: String,
    /// Destination object path.
    pub key: String,
    /// Total upload size in bytes.
    pub total_size: i64,
    /// Chunk size in bytes.
    pub chunk_size: i64,
    /// Total number of chunks expected.
    pub total_chunks: i32,
    /// Indices that have been uploaded so far.
    pub completed_chunks: Vec<i32>,
    /// Indices still outstanding.
    pub missing_chunks: Vec<i32>,
    /// Current lifecycle state.
    pub status: String,
}

impl From<&ChunkedUploadSession> for ChunkedUploadSessionView {
    fn from(session: &ChunkedUploadSession) -> Self {
        Self {
            session_id: session.session_id,
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            total_size: session.total_size,
            chunk_size: session.chunk_size,
            total_chunks: session.total_chunks,
            completed_chunks: session.completed_chunks.iter().copied().collect(),
            missing_chunks: session.missing_chunks(),
            status: upload_status_label(session.status).to_string(),
        }
    }
}

fn upload_status_label(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Active => "active",
        UploadStatus::Completing => "completing",
        UploadStatus::Completed => "completed",
        UploadStatus::Aborted => "aborted",
    }
}

/// Response body for `GET /storage/object?token=...` signed-URL issuance
/// endpoints (`POST /storage/{bucket}/{path}/sign`, etc.).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedUrlResponse {
    /// The fully-formed signed URL, including the `?token=...` query
    /// parameter (local backend) or S3 presigned query string.
    pub signed_url: String,
    /// Seconds until the signed URL expires.
    pub expires_in: i64,
}

/// View of a resolved [`Setting`] returned by the admin settings API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingView {
    /// Dotted setting key.
    pub key: String,
    /// Current resolved value.
    pub value: Value,
    /// `true` iff an environment variable currently overrides this key.
    pub overridden: bool,
    /// Monotonic DB-layer revision.
    pub revision: i64,
}

impl From<&Setting> for SettingView {
    fn from(setting: &Setting) -> Self {
        Self {
            key: setting.key.clone(),
            value: setting.value.clone(),
            overridden: setting.overridden,
            revision: setting.revision,
        }
    }
}

/// View of a [`SecretMetadata`] record returned by the admin secrets API.
/// The plaintext value is never included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretMetadataView {
    /// Secret key.
    pub key: String,
    /// Whether a value is currently stored.
    pub set: bool,
    /// Whether an environment variable overrides this secret.
    pub overridden: bool,
}

impl From<&SecretMetadata> for SecretMetadataView {
    fn from(secret: &SecretMetadata) -> Self {
        Self {
            key: secret.key.clone(),
            set: secret.set,
            overridden: secret.overridden,
        }
    }
}

/// Request body for `POST /admin/setup/start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SetupStartRequest {
    /// Optional human-readable label for the first API key.
    #[serde(default)]
    pub label: Option<String>,
}

/// Response body for `POST /admin/setup/start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetupStartResponse {
    /// One-time setup token the operator must present to
    /// `POST /admin/setup/complete`.
    pub setup_token: String,
    /// Seconds until the setup token expires.
    pub expires_in: i64,
}

/// Request body for `POST /admin/setup/complete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetupCompleteRequest {
    /// The plaintext setup token issued by `POST /admin/setup/start`.
    pub setup_token: String,
}

/// Response body for `POST /admin/setup/complete`: the first admin API key,
/// returned in plaintext exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetupCompleteResponse {
    /// Identifier for the newly issued API key.
    pub key_id: String,
    /// Plaintext secret; only ever returned at issuance time.
    pub secret: String,
}

/// Request body for the admin SQL editor endpoint. Carries a raw,
/// semicolon-delimited statement batch; no structural parsing beyond
/// statement-splitting is performed, per spec Non-goals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SqlEditorRequest {
    /// One or more `;`-separated SQL statements to execute sequentially.
    pub statements: String,
}

/// Result of executing one statement through the admin SQL editor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqlStatementResult {
    /// The statement text as submitted (trimmed).
    pub statement: String,
    /// Number of rows affected, for DML statements.
    pub rows_affected: u64,
    /// Returned rows, for statements producing a result set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<HashMap<String, Value>>,
}

/// Response body for the admin SQL editor endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqlEditorResponse {
    /// Per-statement execution results, in submission order.
    pub results: Vec<SqlStatementResult>,
}

/// Response body for `GET /health` and `GET /health/full`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthView {
    /// Coarse health label (`ok`, `degraded`, `unavailable`).
    pub status: String,
    /// Per-dependency health checks, present only on `/health/full`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheckView>,
}

/// A single dependency health check result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheckView {
    /// Name of the checked dependency (`database`, `storage_backend`, …).
    pub name: String,
    /// `true` if the dependency responded successfully.
    pub healthy: bool,
    /// Optional diagnostic detail when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfront_introspect::{ColumnDescriptor, FunctionDescriptor, ParameterDescriptor, ParameterMode, Volatility};
    use pgfront_storage::model::ChunkedUploadOptions;
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    #[test]
    fn preferences_parses_known_tokens_and_ignores_unknown() {
        let preferences = Preferences::parse("return=minimal, resolution=merge-duplicates, missing=default, bogus=1");
        assert_eq!(preferences.return_kind, ReturnPreference::Minimal);
        assert_eq!(preferences.resolution, Some(ResolutionPreference::MergeDuplicates));
        assert!(preferences.missing_default);
    }

    #[test]
    fn preferences_default_is_representation() {
        let preferences = Preferences::parse("");
        assert_eq!(preferences.return_kind, ReturnPreference::Representation);
        assert!(preferences.resolution.is_none());
    }

    #[test]
    fn content_range_renders_wildcard_total() {
        let range = ContentRange { start: 0, end: 9, total: None };
        assert_eq!(range.to_header_value(), "0-9/*");
        let range = ContentRange { start: 0, end: 9, total: Some(42) };
        assert_eq!(range.to_header_value(), "0-9/42");
    }

    #[test]
    fn table_view_marks_primary_key_columns() {
        let table = TableDescriptor {
            schema: "public".to_string(),
            name: "widgets".to_string(),
            columns: vec![
                ColumnDescriptor {
                    name: "id".to_string(),
                    position: 1,
                    pg_type: "uuid".to_string(),
                    nullable: false,
                    has_default: true,
                    is_generated: false,
                },
                ColumnDescriptor {
                    name: "label".to_string(),
                    position: 2,
                    pg_type: "text".to_string(),
                    nullable: true,
                    has_default: false,
                    is_generated: false,
                },
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
            is_view: false,
            rls_enabled: true,
        };

        let view = TableView::from(&table);
        assert!(view.columns[0].is_primary_key);
        assert!(!view.columns[1].is_primary_key);
    }

    #[test]
    fn catalog_view_excludes_non_public_functions() {
        let catalog = Catalog {
            version: 7,
            tables: vec![],
            functions: vec![
                FunctionDescriptor {
                    schema: "public".to_string(),
                    name: "visible_fn".to_string(),
                    parameters: vec![ParameterDescriptor {
                        name: "a".to_string(),
                        pg_type: "integer".to_string(),
                        has_default: false,
                        mode: ParameterMode::In,
                    }],
                    return_type: "integer".to_string(),
                    returns_set: false,
                    volatility: Volatility::Stable,
                    is_public: true,
                },
                FunctionDescriptor {
                    schema: "public".to_string(),
                    name: "hidden_fn".to_string(),
                    parameters: vec![],
                    return_type: "void".to_string(),
                    returns_set: false,
                    volatility: Volatility::Volatile,
                    is_public: false,
                },
            ],
        };

        let view = CatalogView::from(&catalog);
        assert_eq!(view.version, 7);
        assert_eq!(view.functions.len(), 1);
        assert_eq!(view.functions[0].name, "visible_fn");
    }

    #[test]
    fn chunked_upload_session_view_reports_missing_chunks() {
        let options = ChunkedUploadOptions { ttl: chrono::Duration::hours(1) };
        let _ = options;
        let session = ChunkedUploadSession {
            session_id: Uuid::new_v4(),
            bucket: "uploads".to_string(),
            key: "big.bin".to_string(),
            total_size: 30,
            chunk_size: 10,
            total_chunks: 3,
            completed_chunks: BTreeSet::from([0, 2]),
            part_etags: BTreeMap::new(),
            status: UploadStatus::Active,
            expires_at: chrono::Utc::now(),
            created_at: chrono::Utc::now(),
            owner_id: None,
            backend: pgfront_storage::model::StorageBackendKind::Local,
            s3_multipart_id: None,
        };

        let view = ChunkedUploadSessionView::from(&session);
        assert_eq!(view.completed_chunks, vec![0, 2]);
        assert_eq!(view.missing_chunks, vec![1]);
        assert_eq!(view.status, "active");
    }
}
