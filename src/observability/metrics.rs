//! Metrics collection and exposition.
//!
//! # Metrics
//! - `apiserver_auth_attempts_total` (counter): by `strategy` and `outcome`
//! - `apiserver_shutdown_callbacks_total` (counter): by `outcome`
//!
//! Without an installed recorder the macros are no-ops, so tests and
//! deployments with metrics disabled pay nothing.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::StrategyKind;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;

    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_auth(strategy: StrategyKind, outcome: &'static str) {
    metrics::counter!(
        "apiserver_auth_attempts_total",
        "strategy" => strategy.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_shutdown_callback(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("apiserver_shutdown_callbacks_total", "outcome" => outcome).increment(1);
}
