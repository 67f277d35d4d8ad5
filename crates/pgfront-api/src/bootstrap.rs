//! API bootstrap and wiring.

use std::net::SocketAddr;

use pgfront_events::EventBus;
use pgfront_introspect::SchemaCache;
use pgfront_storage::StorageService;
use pgfront_telemetry::Metrics;
use sqlx::PgPool;

use crate::ApiServer;
use crate::app::state::BootstrapMode;
use crate::config::SharedConfig;
use crate::error::{ApiServerError, ApiServerResult};

/// Build the API server with provided dependencies.
///
/// # Errors
///
/// Returns an error if API server initialization fails.
#[allow(clippy::too_many_arguments)]
pub fn build_api(
    config: SharedConfig,
    pool: PgPool,
    schema_cache: SchemaCache,
    storage: StorageService,
    events: EventBus,
    telemetry: Metrics,
    jwt_secret: Vec<u8>,
) -> ApiServerResult<ApiServer> {
    ApiServer::new(config, pool, schema_cache, storage, events, telemetry, jwt_secret)
}

/// Validate bind addr and mode before serving.
///
/// # Errors
///
/// Returns `ApiServerError::InvalidBindAddr` when setup mode is bound to a non-loopback address.
pub fn validate_bind(mode: BootstrapMode, addr: &SocketAddr) -> ApiServerResult<()> {
    if matches!(mode, BootstrapMode::Setup) && !addr.ip().is_loopback() {
        return Err(ApiServerError::InvalidBindAddr { mode, addr: *addr });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn validate_bind_rejects_setup_non_loopback() -> Result<(), Box<dyn Error>> {
        let addr: SocketAddr = "0.0.0.0:7070".parse()?;
        assert!(matches!(
            validate_bind(BootstrapMode::Setup, &addr),
            Err(ApiServerError::InvalidBindAddr { .. })
        ));
        Ok(())
    }

    #[test]
    fn validate_bind_allows_loopback_and_active() -> Result<(), Box<dyn Error>> {
        let loopback: SocketAddr = "127.0.0.1:7070".parse()?;
        validate_bind(BootstrapMode::Setup, &loopback)?;

        let public: SocketAddr = "0.0.0.0:7070".parse()?;
        validate_bind(BootstrapMode::Active, &public)?;
        Ok(())
    }
}
