//! Fixed-schema JSON log records
//!
//! Every record is one line of JSON with the same leading fields:
//!
//! ```json
//! {"timestamp":"2025-01-01T12:00:00.000000Z","level":"INFO","logger":"agent",
//!  "message":"Function get_order_status completed","module":"observable_agent::observability::instrument",
//!  "function":"record","call_id":"c-1","function_name":"get_order_status","duration_ms":201.37}
//! ```
//!
//! Contextual fields come from [`LogContext`], which has one optional slot per
//! allow-listed key. Only populated slots are written. `module` and `function`
//! are captured at the call site by [`log_info!`](crate::log_info) and
//! [`log_error!`](crate::log_error), so they always name the caller.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Constant logger name carried by every record
pub const LOGGER_NAME: &str = "agent";

/// Context keys a record may carry, in output order
pub const ALLOWED_FIELDS: [&str; 8] = [
    "call_id",
    "customer_id",
    "function_name",
    "duration_ms",
    "error_type",
    "ticket_id",
    "priority",
    "department",
];

/// Record severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Static provenance of a log call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub module: &'static str,
    pub function: &'static str,
}

/// Allow-listed contextual fields, one optional slot each
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_function_name(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    /// Store an elapsed duration as milliseconds rounded to 2 decimals
    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = Some(round_duration_ms(elapsed.as_secs_f64() * 1000.0));
        self
    }

    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_ticket_id(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Pick allow-listed keys out of an arbitrary JSON object.
    ///
    /// Keys outside [`ALLOWED_FIELDS`] are dropped. Non-string values are
    /// stored in their JSON text form, except `duration_ms` which must be
    /// numeric to be kept.
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            payload.get(key).and_then(|value| match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
        };

        Self {
            call_id: text("call_id"),
            customer_id: text("customer_id"),
            function_name: text("function_name"),
            duration_ms: payload
                .get("duration_ms")
                .and_then(Value::as_f64)
                .map(round_duration_ms),
            error_type: text("error_type"),
            ticket_id: text("ticket_id"),
            priority: text("priority"),
            department: text("department"),
        }
    }
}

/// Round milliseconds to 2 decimal places
pub fn round_duration_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

#[derive(Serialize)]
struct LogRecord<'a> {
    timestamp: &'a str,
    level: LogLevel,
    logger: &'static str,
    message: &'a str,
    module: &'static str,
    function: &'static str,
    #[serde(flatten)]
    context: &'a LogContext,
}

/// Destination for serialized records, one call per line
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes records to the process's standard error stream
#[derive(Debug, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, line: &str) {
        // The lock is held for the whole line so concurrent records never interleave.
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}

/// Structured logger shared by the wrapper, the tools and the server.
///
/// Cheap to clone; all clones write to the same sink.
#[derive(Clone)]
pub struct StructuredLogger {
    sink: Arc<dyn LogSink>,
}

impl StructuredLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger writing to stderr
    pub fn stderr() -> Self {
        Self::new(Arc::new(StderrSink))
    }

    /// Serialize and write one record.
    ///
    /// Prefer the [`log_info!`](crate::log_info) / [`log_error!`](crate::log_error)
    /// macros, which fill in `site` from the caller.
    pub fn emit(&self, level: LogLevel, message: &str, context: &LogContext, site: CallSite) {
        let line = render_line(level, message, context, site);
        self.sink.write_line(&line);
    }
}

impl std::fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogger").finish_non_exhaustive()
    }
}

fn render_line(level: LogLevel, message: &str, context: &LogContext, site: CallSite) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let record = LogRecord {
        timestamp: &timestamp,
        level,
        logger: LOGGER_NAME,
        message,
        module: site.module,
        function: site.function,
        context,
    };

    serde_json::to_string(&record)
        .unwrap_or_else(|e| degraded_line(&timestamp, level, &e.to_string()))
}

/// Minimal record written when the full record cannot be encoded
fn degraded_line(timestamp: &str, level: LogLevel, error: &str) -> String {
    json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "logger": LOGGER_NAME,
        "serialization_error": error,
    })
    .to_string()
}

#[doc(hidden)]
pub fn type_name_of<T>(_: T) -> &'static str {
    std::any::type_name::<T>()
}

/// Reduce the type path of a marker fn to the name of the fn enclosing it
#[doc(hidden)]
pub fn enclosing_function(marker_path: &'static str) -> &'static str {
    let mut path = marker_path.strip_suffix("::__marker").unwrap_or(marker_path);
    while let Some(stripped) = path.strip_suffix("::{{closure}}") {
        path = stripped;
    }
    path.rsplit("::").next().unwrap_or(path)
}

/// Name of the function this macro is expanded in
#[macro_export]
macro_rules! function_name {
    () => {{
        fn __marker() {}
        $crate::observability::structured::enclosing_function(
            $crate::observability::structured::type_name_of(__marker),
        )
    }};
}

/// Call site of the macro expansion
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::observability::structured::CallSite {
            module: module_path!(),
            function: $crate::function_name!(),
        }
    };
}

/// Emit an INFO record: `log_info!(logger, context, "format", args...)`
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $context:expr, $($arg:tt)+) => {
        $logger.emit(
            $crate::observability::structured::LogLevel::Info,
            &format!($($arg)+),
            &$context,
            $crate::call_site!(),
        )
    };
}

/// Emit an ERROR record: `log_error!(logger, context, "format", args...)`
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $context:expr, $($arg:tt)+) => {
        $logger.emit(
            $crate::observability::structured::LogLevel::Error,
            &format!($($arg)+),
            &$context,
            $crate::call_site!(),
        )
    };
}
