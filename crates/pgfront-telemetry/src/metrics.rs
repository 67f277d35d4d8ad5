//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to pgfront services.

use std::convert::TryFrom;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    query_rows_affected_total: IntCounterVec,
    rls_denials_total: IntCounter,
    translator_rejections_total: IntCounterVec,
    schema_cache_version: IntGauge,
    upload_sessions_active: IntGauge,
    upload_sessions_total: IntCounterVec,
    signed_url_validations_total: IntCounterVec,
    config_watch_latency_ms: IntGauge,
    config_apply_latency_ms: IntGauge,
    config_update_failures_total: IntCounter,
    config_watch_slow_total: IntCounter,
    rate_limit_throttled_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Catalog version the schema cache currently reflects.
    pub schema_cache_version: i64,
    /// Number of chunked upload sessions currently active.
    pub upload_sessions_active: i64,
    /// Latest latency (ms) when watching for configuration changes.
    pub config_watch_latency_ms: i64,
    /// Latest latency (ms) when applying configuration changes.
    pub config_apply_latency_ms: i64,
    /// Total count of configuration update failures observed.
    pub config_update_failures_total: u64,
    /// Total count of slow configuration watch intervals observed.
    pub config_watch_slow_total: u64,
    /// Total count of RLS-denied queries observed.
    pub rls_denials_total: u64,
    /// Total requests throttled by rate limiting.
    pub rate_limit_throttled_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Domain events emitted by type"),
            &["type"],
        )?;
        let query_rows_affected_total = IntCounterVec::new(
            Opts::new(
                "query_rows_affected_total",
                "Rows affected by translated queries, by table and operation",
            ),
            &["table", "operation"],
        )?;
        let rls_denials_total = IntCounter::with_opts(Opts::new(
            "rls_denials_total",
            "Queries that returned zero rows because row-level security denied access",
        ))?;
        let translator_rejections_total = IntCounterVec::new(
            Opts::new(
                "translator_rejections_total",
                "Query strings rejected by the translator, by reason",
            ),
            &["reason"],
        )?;
        let schema_cache_version =
            IntGauge::with_opts(Opts::new("schema_cache_version", "Active catalog version"))?;
        let upload_sessions_active = IntGauge::with_opts(Opts::new(
            "upload_sessions_active",
            "Chunked upload sessions currently active",
        ))?;
        let upload_sessions_total = IntCounterVec::new(
            Opts::new(
                "upload_sessions_total",
                "Chunked upload sessions terminated, by outcome",
            ),
            &["outcome"],
        )?;
        let signed_url_validations_total = IntCounterVec::new(
            Opts::new(
                "signed_url_validations_total",
                "Signed URL validations, by outcome",
            ),
            &["outcome"],
        )?;
        let config_watch_latency_ms = IntGauge::with_opts(Opts::new(
            "config_watch_latency_ms",
            "Time spent waiting for configuration updates (ms)",
        ))?;
        let config_apply_latency_ms = IntGauge::with_opts(Opts::new(
            "config_apply_latency_ms",
            "Time taken to apply configuration updates (ms)",
        ))?;
        let config_update_failures_total = IntCounter::with_opts(Opts::new(
            "config_update_failures_total",
            "Configuration update failures",
        ))?;
        let config_watch_slow_total = IntCounter::with_opts(Opts::new(
            "config_watch_slow_total",
            "Configuration updates exceeding the latency guard rail",
        ))?;
        let rate_limit_throttled_total = IntCounter::with_opts(Opts::new(
            "api_rate_limit_throttled_total",
            "Requests rejected due to rate limiting",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(events_emitted_total.clone()))?;
        registry.register(Box::new(query_rows_affected_total.clone()))?;
        registry.register(Box::new(rls_denials_total.clone()))?;
        registry.register(Box::new(translator_rejections_total.clone()))?;
        registry.register(Box::new(schema_cache_version.clone()))?;
        registry.register(Box::new(upload_sessions_active.clone()))?;
        registry.register(Box::new(upload_sessions_total.clone()))?;
        registry.register(Box::new(signed_url_validations_total.clone()))?;
        registry.register(Box::new(config_watch_latency_ms.clone()))?;
        registry.register(Box::new(config_apply_latency_ms.clone()))?;
        registry.register(Box::new(config_update_failures_total.clone()))?;
        registry.register(Box::new(config_watch_slow_total.clone()))?;
        registry.register(Box::new(rate_limit_throttled_total.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                http_requests_total,
                events_emitted_total,
                query_rows_affected_total,
                rls_denials_total,
                translator_rejections_total,
                schema_cache_version,
                upload_sessions_active,
                upload_sessions_total,
                signed_url_validations_total,
                config_watch_latency_ms,
                config_apply_latency_ms,
                config_update_failures_total,
                config_watch_slow_total,
                rate_limit_throttled_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Record rows affected by a translated query against a table.
    pub fn inc_query_rows_affected(&self, table: &str, operation: &str, rows: u64) {
        self.inner
            .query_rows_affected_total
            .with_label_values(&[table, operation])
            .inc_by(rows);
    }

    /// Increment the RLS denial counter.
    pub fn inc_rls_denial(&self) {
        self.inner.rls_denials_total.inc();
    }

    /// Increment the translator rejection counter for the given reason.
    pub fn inc_translator_rejection(&self, reason: &str) {
        self.inner
            .translator_rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Set the active schema cache version gauge.
    pub fn set_schema_cache_version(&self, version: i64) {
        self.inner.schema_cache_version.set(version);
    }

    /// Set the active upload session gauge.
    pub fn set_upload_sessions_active(&self, count: i64) {
        self.inner.upload_sessions_active.set(count);
    }

    /// Increment the upload session outcome counter (completed, aborted, expired).
    pub fn inc_upload_session_outcome(&self, outcome: &str) {
        self.inner
            .upload_sessions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the signed URL validation counter (accepted, expired, bad_mac, rate_limited).
    pub fn inc_signed_url_validation(&self, outcome: &str) {
        self.inner
            .signed_url_validations_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record the observed latency while waiting for configuration updates.
    pub fn observe_config_watch_latency(&self, duration: Duration) {
        self.inner
            .config_watch_latency_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Record the observed latency for applying configuration updates.
    pub fn observe_config_apply_latency(&self, duration: Duration) {
        self.inner
            .config_apply_latency_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Increment the configuration update failure counter.
    pub fn inc_config_update_failure(&self) {
        self.inner.config_update_failures_total.inc();
    }

    /// Increment the counter tracking slow configuration applications.
    pub fn inc_config_watch_slow(&self) {
        self.inner.config_watch_slow_total.inc();
    }

    /// Increment the rate limiter throttle counter.
    pub fn inc_rate_limit_throttled(&self) {
        self.inner.rate_limit_throttled_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            schema_cache_version: self.inner.schema_cache_version.get(),
            upload_sessions_active: self.inner.upload_sessions_active.get(),
            config_watch_latency_ms: self.inner.config_watch_latency_ms.get(),
            config_apply_latency_ms: self.inner.config_apply_latency_ms.get(),
            config_update_failures_total: self.inner.config_update_failures_total.get(),
            config_watch_slow_total: self.inner.config_watch_slow_total.get(),
            rls_denials_total: self.inner.rls_denials_total.get(),
            rate_limit_throttled_total: self.inner.rate_limit_throttled_total.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/rest/v1/widgets", 200);
        metrics.inc_event("schema_reloaded");
        metrics.inc_query_rows_affected("widgets", "select", 3);
        metrics.inc_rls_denial();
        metrics.inc_translator_rejection("invalid_operator");
        metrics.set_schema_cache_version(7);
        metrics.set_upload_sessions_active(2);
        metrics.inc_upload_session_outcome("completed");
        metrics.inc_signed_url_validation("accepted");
        metrics.observe_config_watch_latency(Duration::from_millis(120));
        metrics.observe_config_apply_latency(Duration::from_millis(45));
        metrics.inc_config_update_failure();
        metrics.inc_config_watch_slow();
        metrics.inc_rate_limit_throttled();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.schema_cache_version, 7);
        assert_eq!(snapshot.upload_sessions_active, 2);
        assert_eq!(snapshot.config_watch_latency_ms, 120);
        assert_eq!(snapshot.config_apply_latency_ms, 45);
        assert_eq!(snapshot.config_update_failures_total, 1);
        assert_eq!(snapshot.config_watch_slow_total, 1);
        assert_eq!(snapshot.rls_denials_total, 1);
        assert_eq!(snapshot.rate_limit_throttled_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("query_rows_affected_total"));
        assert!(rendered.contains("signed_url_validations_total"));
        Ok(())
    }
}
