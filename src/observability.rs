//! Metrics abstraction for the messaging runtime
//!
//! A `Metrics` sink records named histogram observations (durations, in
//! milliseconds) without tying the runtime to a particular telemetry
//! backend. `NoopMetrics` is used by default and in tests; `TracingMetrics`
//! emits a `tracing` event per observation for processes that scrape logs
//! rather than running a metrics exporter.

use std::sync::Arc;

use tracing::debug;

/// Histogram name recording agent creation latency (warn threshold: 50ms)
pub const METRIC_AGENT_CREATION_MS: &str = "agent_creation_ms";
/// Histogram name recording agent destruction latency (warn threshold: 100ms)
pub const METRIC_AGENT_DESTRUCTION_MS: &str = "agent_destruction_ms";
/// Histogram name recording end-to-end message delivery latency (warn threshold: 10ms)
pub const METRIC_MESSAGE_DELIVERY_MS: &str = "message_delivery_ms";
/// Histogram name recording Message Router routing latency (warn threshold: 30ms)
pub const METRIC_ROUTING_MS: &str = "routing_ms";
/// Histogram name recording Pattern Matcher match latency (warn threshold: 5ms)
pub const METRIC_PATTERN_MATCH_MS: &str = "pattern_match_ms";
/// Histogram name recording Health Monitor health-check latency (warn threshold: 1ms)
pub const METRIC_HEALTH_CHECK_MS: &str = "health_check_ms";

/// A sink for duration histograms, keyed by metric name and optional labels.
pub trait Metrics: Send + Sync + std::fmt::Debug {
    /// Records one observation, in milliseconds, for the named histogram.
    fn observe(&self, name: &'static str, labels: &[(&'static str, &str)], millis: f64);
}

/// Discards every observation. The default for tests and for embedders that
/// don't want a metrics backend.
#[derive(Debug, Clone, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn observe(&self, _name: &'static str, _labels: &[(&'static str, &str)], _millis: f64) {}
}

/// Emits a `tracing::debug!` event per observation.
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn observe(&self, name: &'static str, labels: &[(&'static str, &str)], millis: f64) {
        debug!(metric = name, ?labels, millis, "metric observed");
    }
}

/// Shared handle to a `Metrics` sink.
pub type SharedMetrics = Arc<dyn Metrics>;

/// Builds the default production metrics sink.
#[must_use]
pub fn tracing_metrics() -> SharedMetrics {
    Arc::new(TracingMetrics)
}

/// Builds a metrics sink that discards everything, for tests.
#[must_use]
pub fn noop_metrics() -> SharedMetrics {
    Arc::new(NoopMetrics)
}
