//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
mod metrics;

pub use self::logging::{init_logging, LogFormat};
pub use self::metrics::{
    record_discard, record_latency, record_price_fetch_failure, record_subscriber_error,
    set_gauge, GaugeMetric, LatencyMetric,
};

use crate::config::TelemetryConfig;
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize logging and, when a port is configured, the metrics exporter
///
/// The exporter spawns its listener on the current tokio runtime.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level, config.log_format)?;

    if let Some(port) = config.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        tracing::info!(%addr, "Prometheus metrics exporter listening");
    }

    Ok(())
}
