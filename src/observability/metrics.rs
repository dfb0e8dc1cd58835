//! Thread-safe metrics registry
//!
//! A fixed set of Prometheus instruments, created once at startup and passed
//! around as a [`MetricsRegistry`] handle. When the backend cannot be built
//! (or metrics are disabled) the handle wraps [`NullMetrics`] instead and every
//! operation becomes a no-op; callers never branch on availability.
//!
//! Label values are positional and follow [`Metric::label_names`]. The `agent`
//! label is filled in by the handle, so call sites pass only the rest.

use prometheus::{
    proto::MetricFamily, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Prefix applied to every exposed metric name
pub const NAMESPACE: &str = "voice_agent";

/// Latency histogram buckets, in seconds
pub const LATENCY_BUCKETS: [f64; 8] = [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// The fixed instrument set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    CallsTotal,
    ActiveCalls,
    FunctionCallsTotal,
    FunctionLatencySeconds,
    TicketsTotal,
    TransfersTotal,
    ErrorsTotal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::CallsTotal,
        Metric::ActiveCalls,
        Metric::FunctionCallsTotal,
        Metric::FunctionLatencySeconds,
        Metric::TicketsTotal,
        Metric::TransfersTotal,
        Metric::ErrorsTotal,
    ];

    /// Name without the namespace prefix
    pub fn name(&self) -> &'static str {
        match self {
            Metric::CallsTotal => "calls_total",
            Metric::ActiveCalls => "active_calls",
            Metric::FunctionCallsTotal => "function_calls_total",
            Metric::FunctionLatencySeconds => "function_latency_seconds",
            Metric::TicketsTotal => "tickets_total",
            Metric::TransfersTotal => "transfers_total",
            Metric::ErrorsTotal => "errors_total",
        }
    }

    /// Name as it appears in the text exposition
    pub fn exposed_name(&self) -> String {
        format!("{NAMESPACE}_{}", self.name())
    }

    pub fn help(&self) -> &'static str {
        match self {
            Metric::CallsTotal => "Total calls received",
            Metric::ActiveCalls => "Currently active calls",
            Metric::FunctionCallsTotal => "Total function calls",
            Metric::FunctionLatencySeconds => "Function execution latency",
            Metric::TicketsTotal => "Support tickets created",
            Metric::TransfersTotal => "Call transfers",
            Metric::ErrorsTotal => "Total errors",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::ActiveCalls => MetricKind::Gauge,
            Metric::FunctionLatencySeconds => MetricKind::Histogram,
            _ => MetricKind::Counter,
        }
    }

    /// Label names in positional order; `agent` is always first
    pub fn label_names(&self) -> &'static [&'static str] {
        match self {
            Metric::CallsTotal => &["agent", "status"],
            Metric::ActiveCalls => &["agent"],
            Metric::FunctionCallsTotal => &["agent", "function", "status"],
            Metric::FunctionLatencySeconds => &["agent", "function"],
            Metric::TicketsTotal => &["agent", "priority"],
            Metric::TransfersTotal => &["agent", "department"],
            Metric::ErrorsTotal => &["agent", "function", "error_type"],
        }
    }
}

/// A label value drawn from a closed enumeration
pub trait LabelValue {
    fn label(&self) -> &'static str;
}

/// Outcome label for call and function counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl LabelValue for CallStatus {
    fn label(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Metrics errors
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metric {metric} expects {expected} label values, got {actual}")]
    LabelMismatch {
        metric: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Metric {metric} does not support {operation}")]
    UnsupportedOperation {
        metric: &'static str,
        operation: &'static str,
    },

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

/// Current value of one labelled series
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Counter(f64),
    Gauge(f64),
    Histogram { count: u64, sum: f64 },
}

/// A (metric, label set, value) triple read back from the backend
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric: Metric,
    pub labels: Vec<(String, String)>,
    pub value: SampleValue,
}

/// Storage strategy behind [`MetricsRegistry`].
///
/// `labels` always carries every label value, `agent` included.
pub trait MetricsBackend: Send + Sync {
    fn is_active(&self) -> bool;

    fn increment(&self, metric: Metric, labels: &[&str]) -> Result<(), MetricsError>;

    fn observe(&self, metric: Metric, labels: &[&str], value: f64) -> Result<(), MetricsError>;

    fn set(&self, metric: Metric, labels: &[&str], value: f64) -> Result<(), MetricsError>;

    /// Read a series without creating it
    fn sample(&self, metric: Metric, labels: &[&str]) -> Option<MetricSample>;

    /// Prometheus text exposition of every series
    fn encode_text(&self) -> Result<String, MetricsError>;
}

/// Prometheus-backed instruments
pub struct LiveMetrics {
    registry: Registry,
    counters: HashMap<Metric, CounterVec>,
    gauges: HashMap<Metric, GaugeVec>,
    histograms: HashMap<Metric, HistogramVec>,
}

impl LiveMetrics {
    /// Build and register the full instrument set
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let mut counters = HashMap::new();
        let mut gauges = HashMap::new();
        let mut histograms = HashMap::new();

        for metric in Metric::ALL {
            let opts = Opts::new(metric.name(), metric.help()).namespace(NAMESPACE);
            match metric.kind() {
                MetricKind::Counter => {
                    let counter = CounterVec::new(opts, metric.label_names())?;
                    registry.register(Box::new(counter.clone()))?;
                    counters.insert(metric, counter);
                }
                MetricKind::Gauge => {
                    let gauge = GaugeVec::new(opts, metric.label_names())?;
                    registry.register(Box::new(gauge.clone()))?;
                    gauges.insert(metric, gauge);
                }
                MetricKind::Histogram => {
                    let histogram = HistogramVec::new(
                        HistogramOpts::from(opts).buckets(LATENCY_BUCKETS.to_vec()),
                        metric.label_names(),
                    )?;
                    registry.register(Box::new(histogram.clone()))?;
                    histograms.insert(metric, histogram);
                }
            }
        }

        Ok(Self {
            registry,
            counters,
            gauges,
            histograms,
        })
    }

    /// Gather all metric families
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    fn check_labels(metric: Metric, labels: &[&str]) -> Result<(), MetricsError> {
        let expected = metric.label_names().len();
        if labels.len() != expected {
            return Err(MetricsError::LabelMismatch {
                metric: metric.name(),
                expected,
                actual: labels.len(),
            });
        }
        Ok(())
    }

    fn unsupported(metric: Metric, operation: &'static str) -> MetricsError {
        MetricsError::UnsupportedOperation {
            metric: metric.name(),
            operation,
        }
    }
}

impl MetricsBackend for LiveMetrics {
    fn is_active(&self) -> bool {
        true
    }

    fn increment(&self, metric: Metric, labels: &[&str]) -> Result<(), MetricsError> {
        Self::check_labels(metric, labels)?;
        if let Some(counter) = self.counters.get(&metric) {
            counter.get_metric_with_label_values(labels)?.inc();
            Ok(())
        } else if let Some(gauge) = self.gauges.get(&metric) {
            gauge.get_metric_with_label_values(labels)?.inc();
            Ok(())
        } else {
            Err(Self::unsupported(metric, "increment"))
        }
    }

    fn observe(&self, metric: Metric, labels: &[&str], value: f64) -> Result<(), MetricsError> {
        Self::check_labels(metric, labels)?;
        let histogram = self
            .histograms
            .get(&metric)
            .ok_or_else(|| Self::unsupported(metric, "observe"))?;
        histogram.get_metric_with_label_values(labels)?.observe(value);
        Ok(())
    }

    fn set(&self, metric: Metric, labels: &[&str], value: f64) -> Result<(), MetricsError> {
        Self::check_labels(metric, labels)?;
        let gauge = self
            .gauges
            .get(&metric)
            .ok_or_else(|| Self::unsupported(metric, "set"))?;
        gauge.get_metric_with_label_values(labels)?.set(value);
        Ok(())
    }

    fn sample(&self, metric: Metric, labels: &[&str]) -> Option<MetricSample> {
        if Self::check_labels(metric, labels).is_err() {
            return None;
        }
        let expected: Vec<(String, String)> = metric
            .label_names()
            .iter()
            .zip(labels)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let exposed_name = metric.exposed_name();

        let families = self.gather();
        let family = families.iter().find(|f| f.get_name() == exposed_name)?;
        let series = family.get_metric().iter().find(|m| {
            expected.iter().all(|(name, value)| {
                m.get_label()
                    .iter()
                    .any(|pair| pair.get_name() == name && pair.get_value() == value)
            })
        })?;

        let value = match metric.kind() {
            MetricKind::Counter => SampleValue::Counter(series.get_counter().get_value()),
            MetricKind::Gauge => SampleValue::Gauge(series.get_gauge().get_value()),
            MetricKind::Histogram => {
                let histogram = series.get_histogram();
                SampleValue::Histogram {
                    count: histogram.get_sample_count(),
                    sum: histogram.get_sample_sum(),
                }
            }
        };

        Some(MetricSample {
            metric,
            labels: expected,
            value,
        })
    }

    fn encode_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

/// Backend used when metrics are unavailable; every operation is a no-op
#[derive(Debug, Default)]
pub struct NullMetrics;

impl MetricsBackend for NullMetrics {
    fn is_active(&self) -> bool {
        false
    }

    fn increment(&self, _metric: Metric, _labels: &[&str]) -> Result<(), MetricsError> {
        Ok(())
    }

    fn observe(&self, _metric: Metric, _labels: &[&str], _value: f64) -> Result<(), MetricsError> {
        Ok(())
    }

    fn set(&self, _metric: Metric, _labels: &[&str], _value: f64) -> Result<(), MetricsError> {
        Ok(())
    }

    fn sample(&self, _metric: Metric, _labels: &[&str]) -> Option<MetricSample> {
        None
    }

    fn encode_text(&self) -> Result<String, MetricsError> {
        Ok(String::new())
    }
}

/// Shared handle to the process's metrics.
///
/// Created once at startup and cloned into every component that records
/// metrics. Recording never fails outward: a rejected update is logged and
/// dropped.
#[derive(Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
    agent: Arc<str>,
}

impl MetricsRegistry {
    pub fn with_backend(agent: &str, backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            backend,
            agent: Arc::from(agent),
        }
    }

    /// Registry backed by Prometheus instruments
    pub fn live(agent: &str) -> Result<Self, MetricsError> {
        Ok(Self::with_backend(agent, Arc::new(LiveMetrics::new()?)))
    }

    /// Registry that records nothing
    pub fn null(agent: &str) -> Self {
        Self::with_backend(agent, Arc::new(NullMetrics))
    }

    /// Select the backend once at startup, falling back to no-op on failure
    pub fn start(agent: &str, enabled: bool) -> Self {
        if !enabled {
            info!("Metrics disabled by configuration");
            return Self::null(agent);
        }

        match Self::live(agent) {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Metrics backend unavailable, continuing without metrics: {}", e);
                Self::null(agent)
            }
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn is_active(&self) -> bool {
        self.backend.is_active()
    }

    fn with_agent<'a>(&'a self, labels: &[&'a str]) -> Vec<&'a str> {
        let mut values = Vec::with_capacity(labels.len() + 1);
        values.push(&*self.agent);
        values.extend_from_slice(labels);
        values
    }

    fn report(metric: Metric, result: Result<(), MetricsError>) {
        if let Err(e) = result {
            warn!(metric = metric.name(), "Dropped metric update: {}", e);
        }
    }

    /// Add one to a counter (or gauge)
    pub fn increment(&self, metric: Metric, labels: &[&str]) {
        let result = self.backend.increment(metric, &self.with_agent(labels));
        Self::report(metric, result);
    }

    /// Record one histogram observation
    pub fn observe(&self, metric: Metric, labels: &[&str], value: f64) {
        let result = self.backend.observe(metric, &self.with_agent(labels), value);
        Self::report(metric, result);
    }

    /// Set a gauge
    pub fn set(&self, metric: Metric, labels: &[&str], value: f64) {
        let result = self.backend.set(metric, &self.with_agent(labels), value);
        Self::report(metric, result);
    }

    pub fn sample(&self, metric: Metric, labels: &[&str]) -> Option<MetricSample> {
        self.backend.sample(metric, &self.with_agent(labels))
    }

    /// Counter value for a series, 0.0 when the series was never touched
    pub fn counter_value(&self, metric: Metric, labels: &[&str]) -> f64 {
        match self.sample(metric, labels).map(|s| s.value) {
            Some(SampleValue::Counter(value)) | Some(SampleValue::Gauge(value)) => value,
            _ => 0.0,
        }
    }

    pub fn encode_text(&self) -> Result<String, MetricsError> {
        self.backend.encode_text()
    }

    /// Exposed names of the metrics that carry data, empty when inactive.
    /// `active_calls` is registered but not listed while nothing drives it.
    pub fn available_metrics(&self) -> Vec<String> {
        if !self.is_active() {
            return Vec::new();
        }
        Metric::ALL
            .iter()
            .filter(|metric| **metric != Metric::ActiveCalls)
            .map(Metric::exposed_name)
            .collect()
    }

    /// Count one handler invocation and record its latency
    pub fn record_function_call(&self, function: &str, status: CallStatus, elapsed: Duration) {
        self.increment(Metric::FunctionCallsTotal, &[function, status.label()]);
        self.observe(
            Metric::FunctionLatencySeconds,
            &[function],
            elapsed.as_secs_f64(),
        );
    }

    /// Count one handler fault; `error_type` comes from a closed set
    pub fn record_error(&self, function: &str, error_type: &'static str) {
        self.increment(Metric::ErrorsTotal, &[function, error_type]);
    }

    pub fn record_call(&self, status: CallStatus) {
        self.increment(Metric::CallsTotal, &[status.label()]);
    }

    pub fn record_ticket(&self, priority: &dyn LabelValue) {
        self.increment(Metric::TicketsTotal, &[priority.label()]);
    }

    pub fn record_transfer(&self, department: &dyn LabelValue) {
        self.increment(Metric::TransfersTotal, &[department.label()]);
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("agent", &self.agent)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn live() -> MetricsRegistry {
        MetricsRegistry::live("observable-agent").unwrap()
    }

    #[test]
    fn test_function_call_metrics() {
        let metrics = live();

        metrics.record_function_call(
            "get_order_status",
            CallStatus::Success,
            Duration::from_millis(200),
        );
        metrics.record_function_call(
            "get_order_status",
            CallStatus::Error,
            Duration::from_millis(50),
        );

        assert_eq!(
            metrics.counter_value(
                Metric::FunctionCallsTotal,
                &["get_order_status", "success"]
            ),
            1.0
        );
        assert_eq!(
            metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "error"]),
            1.0
        );
        let latency = metrics
            .sample(Metric::FunctionLatencySeconds, &["get_order_status"])
            .unwrap();
        match latency.value {
            SampleValue::Histogram { count, sum } => {
                assert_eq!(count, 2);
                assert!((sum - 0.25).abs() < 1e-9);
            }
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn test_sample_does_not_create_series() {
        let metrics = live();

        assert!(metrics.sample(Metric::TicketsTotal, &["high"]).is_none());
        assert!(!metrics.encode_text().unwrap().contains("priority=\"high\""));
    }

    #[test]
    fn test_label_mismatch_is_dropped() {
        let metrics = live();

        metrics.increment(Metric::ErrorsTotal, &["only_function"]);

        assert!(!metrics
            .encode_text()
            .unwrap()
            .contains("voice_agent_errors_total{"));
    }

    #[test]
    fn test_unsupported_operations_are_rejected() {
        let backend = LiveMetrics::new().unwrap();

        assert!(matches!(
            backend.observe(Metric::TicketsTotal, &["a", "low"], 1.0),
            Err(MetricsError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            backend.set(Metric::CallsTotal, &["a", "success"], 1.0),
            Err(MetricsError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            backend.increment(Metric::FunctionLatencySeconds, &["a", "f"]),
            Err(MetricsError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_gauge_moves_both_ways() {
        let metrics = live();

        metrics.set(Metric::ActiveCalls, &[], 3.0);
        metrics.increment(Metric::ActiveCalls, &[]);
        assert_eq!(metrics.counter_value(Metric::ActiveCalls, &[]), 4.0);

        metrics.set(Metric::ActiveCalls, &[], 1.0);
        assert_eq!(metrics.counter_value(Metric::ActiveCalls, &[]), 1.0);
    }

    #[test]
    fn test_text_exposition_uses_namespace_and_buckets() {
        let metrics = live();
        metrics.record_function_call("create_ticket", CallStatus::Success, Duration::from_millis(1));
        metrics.record_call(CallStatus::Success);

        let text = metrics.encode_text().unwrap();

        assert!(text.contains("voice_agent_function_calls_total{agent=\"observable-agent\",function=\"create_ticket\",status=\"success\"} 1"));
        assert!(text.contains("voice_agent_function_latency_seconds_bucket"));
        assert!(text.contains("le=\"0.05\""));
        assert!(text.contains("le=\"10\""));
        assert!(text.contains("voice_agent_calls_total"));
    }

    #[test]
    fn test_null_metrics_are_noops() {
        let metrics = MetricsRegistry::null("observable-agent");

        metrics.record_function_call("get_order_status", CallStatus::Success, Duration::ZERO);
        metrics.record_error("get_order_status", "execution_failed");
        metrics.set(Metric::ActiveCalls, &[], 5.0);

        assert!(!metrics.is_active());
        assert!(metrics.available_metrics().is_empty());
        assert!(metrics
            .sample(Metric::FunctionCallsTotal, &["get_order_status", "success"])
            .is_none());
        assert_eq!(metrics.encode_text().unwrap(), "");
    }

    #[test]
    fn test_start_respects_enabled_flag() {
        assert!(MetricsRegistry::start("a", true).is_active());
        assert!(!MetricsRegistry::start("a", false).is_active());
    }

    #[test]
    fn test_available_metrics_lists_driven_instruments() {
        let names = live().available_metrics();

        assert_eq!(names.len(), 6);
        assert!(names.contains(&"voice_agent_function_latency_seconds".to_string()));
        assert!(!names.contains(&"voice_agent_active_calls".to_string()));
    }

    #[test]
    fn test_thread_safety() {
        let metrics = live();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_error("transfer_specialist", "execution_failed");
                        metrics.observe(
                            Metric::FunctionLatencySeconds,
                            &["transfer_specialist"],
                            0.01,
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            metrics.counter_value(
                Metric::ErrorsTotal,
                &["transfer_specialist", "execution_failed"]
            ),
            1000.0
        );
        match metrics
            .sample(Metric::FunctionLatencySeconds, &["transfer_specialist"])
            .unwrap()
            .value
        {
            SampleValue::Histogram { count, .. } => assert_eq!(count, 1000),
            other => panic!("unexpected sample {other:?}"),
        }
    }
}
