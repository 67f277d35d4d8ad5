use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pgfront_api::app::state::BootstrapMode;
use pgfront_config::ConfigService;
use pgfront_events::EventBus;
use pgfront_introspect::{SchemaCache, SchemaIntrospector, SchemaWatcher};
use pgfront_storage::backend::{LocalBackend, StorageBackend};
use pgfront_storage::StorageService;
use pgfront_telemetry::{GlobalContextGuard, LoggingConfig, Metrics, OpenTelemetryConfig};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::tasks::{self, DEFAULT_SWEEP_INTERVAL};

/// Dependencies required to bootstrap the application.
pub(crate) struct BootstrapDependencies {
    logging: LoggingConfig<'static>,
    otel_config: Option<OpenTelemetryConfig<'static>>,
    config: ConfigService,
    jwt_secret: Vec<u8>,
    events: EventBus,
    telemetry: Metrics,
    schema_cache: SchemaCache,
    schema_watcher: SchemaWatcher,
    storage: StorageService,
    bind_addr: IpAddr,
    http_port: u16,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) async fn from_env() -> AppResult<Self> {
        let logging = LoggingConfig::default();
        let otel_config = load_otel_config_from_env();

        let database_url = std::env::var("DATABASE_URL").map_err(|_| AppError::MissingEnv { name: "DATABASE_URL" })?;
        let master_key = decode_base64_env("PGFRONT_MASTER_KEY")?;
        let jwt_secret = decode_base64_env("PGFRONT_JWT_SECRET")?;

        let config = ConfigService::new(database_url, master_key)
            .await
            .map_err(|err| AppError::config("config_service.new", err))?;

        let events = EventBus::new();
        let telemetry = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        let schema_cache = SchemaCache::new();
        let introspector = SchemaIntrospector::new(config.pool().clone(), schema_cache.clone(), events.clone());
        let schema_watcher = SchemaWatcher::new(config.pool().clone(), introspector);

        let storage = build_storage_service(&config, &events, &telemetry).await?;

        let bind_addr = std::env::var("PGFRONT_BIND_ADDR")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(IpAddr::from([127, 0, 0, 1]));
        let http_port = std::env::var("PGFRONT_HTTP_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            logging,
            otel_config,
            config,
            jwt_secret,
            events,
            telemetry,
            schema_cache,
            schema_watcher,
            storage,
            bind_addr,
            http_port,
        })
    }
}

async fn build_storage_service(config: &ConfigService, events: &EventBus, telemetry: &Metrics) -> AppResult<StorageService> {
    let backend: Arc<dyn StorageBackend> = match std::env::var("PGFRONT_STORAGE_BACKEND").ok().as_deref() {
        Some("s3") => {
            let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
            Arc::new(pgfront_storage::backend::S3Backend::new(aws_sdk_s3::Client::new(&sdk_config)))
        }
        _ => {
            let root: PathBuf = std::env::var("PGFRONT_STORAGE_LOCAL_ROOT").map_or_else(|_| PathBuf::from("./data/storage"), PathBuf::from);
            Arc::new(LocalBackend::new(root))
        }
    };
    Ok(StorageService::new(config.pool().clone(), backend, config.clone(), events.clone(), telemetry.clone()))
}

fn decode_base64_env(name: &'static str) -> AppResult<Vec<u8>> {
    let raw = std::env::var(name).map_err(|_| AppError::MissingEnv { name })?;
    BASE64.decode(raw.trim()).map_err(|_| AppError::InvalidConfig {
        field: name,
        reason: "not_valid_base64",
        value: None,
    })
}

/// Entry point for the application boot sequence.
///
/// # Errors
///
/// Returns an error if dependency construction or application startup fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env().await?;
    Box::pin(run_app_with(dependencies)).await
}

/// Boot sequence that relies entirely on injected dependencies to simplify testing.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let otel_ref = dependencies.otel_config.as_ref().map(|cfg| cfg as &OpenTelemetryConfig);
    let _otel_guard =
        pgfront_telemetry::init_logging_with_otel(&dependencies.logging, otel_ref).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");

    info!("pgfront application bootstrap starting");

    let BootstrapDependencies {
        logging: _,
        otel_config: _,
        config,
        jwt_secret,
        events,
        telemetry,
        schema_cache,
        schema_watcher,
        storage,
        bind_addr,
        http_port,
    } = dependencies;

    let shared_config = Arc::new(config.clone());
    let mode = BootstrapMode::resolve(&shared_config)
        .await
        .map_err(|err| AppError::config("bootstrap_mode.resolve", err))?;

    let addr = SocketAddr::new(bind_addr, http_port);
    pgfront_api::bootstrap::validate_bind(mode, &addr).map_err(|err| AppError::api_server("validate_bind", err))?;

    let pool = config.pool().clone();
    let api = pgfront_api::bootstrap::build_api(
        shared_config,
        pool,
        schema_cache,
        storage.clone(),
        events.clone(),
        telemetry.clone(),
        jwt_secret,
    )
    .map_err(|err| AppError::api_server("build_api", err))?;

    let watcher_task = tasks::spawn_schema_watcher(schema_watcher);
    let sweeper_task = tasks::spawn_upload_sweeper(storage, DEFAULT_SWEEP_INTERVAL);

    info!(addr = %addr, "launching API listener");
    let serve_result = api.serve(addr).await;

    for task in [watcher_task, sweeper_task] {
        if !task.is_finished() {
            task.abort();
        }
        if let Err(err) = task.await {
            if !err.is_cancelled() {
                warn!(error = %err, "background task join failed");
            }
        }
    }

    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("API server shutdown complete");
    Ok(())
}

fn load_otel_config_from_env() -> Option<OpenTelemetryConfig<'static>> {
    let enabled = env_flag("PGFRONT_ENABLE_OTEL");
    let service_name = std::env::var("PGFRONT_OTEL_SERVICE_NAME").unwrap_or_else(|_| "pgfront-app".to_string());
    let endpoint = std::env::var("PGFRONT_OTEL_EXPORTER").ok();
    otel_config_from_values(enabled, service_name, endpoint)
}

fn env_flag(name: &str) -> bool {
    env_flag_value(std::env::var(name).ok().as_deref())
}

fn env_flag_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn otel_config_from_values(enabled: bool, service_name: String, endpoint: Option<String>) -> Option<OpenTelemetryConfig<'static>> {
    if !enabled {
        return None;
    }
    Some(OpenTelemetryConfig {
        enabled: true,
        service_name: Cow::Owned(service_name),
        endpoint: endpoint.map(Cow::Owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_handles_truthy_and_falsey() {
        assert!(env_flag_value(Some("TrUe")));
        assert!(!env_flag_value(Some("no")));
        assert!(!env_flag_value(None));
    }

    #[test]
    fn load_otel_config_reads_values() {
        let cfg = otel_config_from_values(true, "svc".into(), Some("http://collector".into())).expect("otel config");
        assert_eq!(cfg.service_name.as_ref(), "svc");
        assert_eq!(cfg.endpoint.as_deref(), Some("http://collector"));
        assert!(otel_config_from_values(false, "svc".into(), None).is_none());
    }

    #[test]
    fn decode_base64_env_rejects_missing_key() {
        assert!(matches!(decode_base64_env("PGFRONT_APP_TEST_UNSET_KEY"), Err(AppError::MissingEnv { .. })));
    }
}
