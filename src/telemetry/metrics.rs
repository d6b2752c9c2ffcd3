//! Prometheus metrics
//!
//! Recorded through the `metrics` facade; without an installed exporter
//! every call is a no-op.

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Slow tick: full universe refresh
    UniverseRefresh,
    /// Fast tick: one price batch
    PriceRefresh,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Markets currently tracked
    LiveMarkets,
    /// Markets skipped by the fast tick after a failed fetch
    StaleMarkets,
    /// Registered subscribers
    Subscribers,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::UniverseRefresh => "polybot_universe_refresh_latency_ms",
        LatencyMetric::PriceRefresh => "polybot_price_refresh_latency_ms",
    };
    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::LiveMarkets => "polybot_live_markets",
        GaugeMetric::StaleMarkets => "polybot_stale_markets",
        GaugeMetric::Subscribers => "polybot_subscribers",
    };
    metrics::gauge!(metric_name).set(value);
}

/// Count a rejected market record by reason code
pub fn record_discard(reason: &'static str) {
    metrics::counter!("polybot_markets_discarded_total", "reason" => reason).increment(1);
}

pub fn record_price_fetch_failure() {
    metrics::counter!("polybot_price_fetch_failures_total").increment(1);
}

pub fn record_subscriber_error() {
    metrics::counter!("polybot_subscriber_errors_total").increment(1);
}
