//! Prometheus metrics for realmgate

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

const METRIC_UPTIME: &str = "realmgate_uptime_seconds";
const METRIC_INFO: &str = "realmgate_info";

// Validation metrics
const METRIC_VALIDATIONS: &str = "realmgate_validations_total";

// Cache metrics
const METRIC_CACHE_HITS: &str = "realmgate_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "realmgate_cache_misses_total";
const METRIC_CACHE_EVICTIONS: &str = "realmgate_cache_evictions_total";

// Token store metrics
const METRIC_TOKEN_STORE_OPS: &str = "realmgate_token_store_operations_total";

/// Initialize Prometheus metrics recorder.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    START_TIME.set(Instant::now()).ok();

    register_metrics();
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics() {
    describe_gauge!(METRIC_UPTIME, "Process uptime in seconds");
    describe_gauge!(METRIC_INFO, "Build information (always 1)");

    describe_counter!(METRIC_VALIDATIONS, "Credential validations by kind and result");

    describe_counter!(METRIC_CACHE_HITS, "Validation cache hits");
    describe_counter!(METRIC_CACHE_MISSES, "Validation cache misses");
    describe_counter!(METRIC_CACHE_EVICTIONS, "Validation cache evictions");

    describe_counter!(METRIC_TOKEN_STORE_OPS, "Token store operations by result");

    gauge!(
        METRIC_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
    )
    .set(1.0);
}

/// Render metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    if let Some(start) = START_TIME.get() {
        gauge!(METRIC_UPTIME).set(start.elapsed().as_secs_f64());
    }

    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record the result of validating one credential.
pub fn record_validation(kind: &str, valid: bool) {
    let result = if valid { "valid" } else { "invalid" };
    counter!(
        METRIC_VALIDATIONS,
        "kind" => kind.to_owned(),
        "result" => result,
    )
    .increment(1);
}

pub fn record_cache_hit() {
    counter!(METRIC_CACHE_HITS).increment(1);
}

pub fn record_cache_miss() {
    counter!(METRIC_CACHE_MISSES).increment(1);
}

pub fn record_cache_eviction() {
    counter!(METRIC_CACHE_EVICTIONS).increment(1);
}

/// Record a token store operation.
pub fn record_token_store_operation(operation: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        METRIC_TOKEN_STORE_OPS,
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics_without_init() {
        let output = render_metrics();
        assert!(output.is_empty());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_validation("OIDC", true);
        record_cache_hit();
        record_token_store_operation("read", false);
    }
}
