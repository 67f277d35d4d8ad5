//! Shared HTTP DTOs for the public API.
//!
//! Re-exported from `pgfront-api-models` so API consumers and the CLI share a
//! single source of truth for request/response shapes.

pub use pgfront_api_models::*;
