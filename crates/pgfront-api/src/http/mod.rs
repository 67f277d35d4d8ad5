//! HTTP surface modules (routers, handlers, middleware).

/// Authentication middleware and helpers.
pub mod auth;
/// Shared constants and header names for HTTP surfaces.
pub mod constants;
/// Dynamic `/{table}` REST CRUD handlers.
pub mod data;
/// OpenAPI document publishing.
pub mod docs;
/// Problem response helpers and error types.
pub mod errors;
/// Health and diagnostics endpoints.
pub mod health;
/// Live log streaming endpoint.
pub mod logs;
/// Rate limit helpers for HTTP responses.
pub mod rate_limit;
/// Router construction and server host.
pub mod router;
/// `POST /rpc/{function}` handlers.
pub mod rpc;
/// Live catalog publishing and schema refresh.
pub mod schema;
/// Settings/secrets configuration handlers.
pub mod settings;
/// Setup bootstrap handlers.
pub mod setup;
/// Server-sent events filters and streaming utilities.
pub mod sse;
/// Admin SQL editor endpoint.
pub mod sql_editor;
/// Bucket/object/chunked-upload/signed-URL handlers.
pub mod storage;
/// Metrics middleware for HTTP requests.
pub mod telemetry;
