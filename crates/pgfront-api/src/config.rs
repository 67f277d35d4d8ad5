//! Shared settings-backend handle threaded through application state.

use std::sync::Arc;

use pgfront_config::ConfigService;

/// Reference-counted handle to the settings/secrets resolver.
pub type SharedConfig = Arc<ConfigService>;
