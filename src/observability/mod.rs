//! Observability system
//!
//! Fixed-schema structured records, Prometheus metrics and the instrumentation
//! wrapper that ties both to tool invocations. Diagnostic logging for the
//! process itself lives in [`logging`].

pub mod instrument;
pub mod logging;
pub mod metrics;
pub mod structured;

pub use instrument::{CallOutcome, InstrumentedTool, Instrumentation};
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{
    CallStatus, LabelValue, LiveMetrics, Metric, MetricSample, MetricsBackend, MetricsError,
    MetricsRegistry, NullMetrics, SampleValue,
};
pub use structured::{LogContext, LogLevel, LogSink, StderrSink, StructuredLogger};
