//! Timing, logging and metrics around every tool invocation
//!
//! [`Instrumentation::invoke`] runs a handler future as its own task, measures
//! it with a monotonic clock, writes exactly one INFO or ERROR record and
//! updates the function counters and latency histogram. Faults (including
//! panics) come back as [`CallOutcome::Failure`] and never propagate. A tool's
//! business events ([`Tool::after_success`]) follow the completion record.
//!
//! There is no timeout: a handler that never finishes keeps its invocation
//! pending.

use crate::error::sanitize_error_message;
use crate::observability::metrics::{CallStatus, MetricsRegistry};
use crate::observability::structured::{LogContext, StructuredLogger};
use crate::tools::{CallContext, Tool, ToolDescription, ToolError, ToolResponse};
use crate::{log_error, log_info};
use jsonschema::Validator;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;

/// Classified result of one handler invocation
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    Failure {
        error_type: &'static str,
        error_message: String,
    },
}

impl<T> CallOutcome<T> {
    pub fn status(&self) -> CallStatus {
        match self {
            CallOutcome::Success(_) => CallStatus::Success,
            CallOutcome::Failure { .. } => CallStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Value on success, otherwise the fallback
    pub fn unwrap_or_else<F: FnOnce() -> T>(self, fallback: F) -> T {
        match self {
            CallOutcome::Success(value) => value,
            CallOutcome::Failure { .. } => fallback(),
        }
    }
}

/// Shared logger and metrics handles used by every wrapped handler
#[derive(Clone, Debug)]
pub struct Instrumentation {
    logger: StructuredLogger,
    metrics: MetricsRegistry,
}

impl Instrumentation {
    pub fn new(logger: StructuredLogger, metrics: MetricsRegistry) -> Self {
        Self { logger, metrics }
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Time a handler and record its outcome
    pub async fn invoke<T, F>(&self, function_name: &str, call_id: &str, handler: F) -> CallOutcome<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ToolError>> + Send + 'static,
    {
        self.invoke_then(function_name, call_id, handler, |_: &T| {})
            .await
    }

    /// Like [`Instrumentation::invoke`], then run `on_success` with the
    /// handler's value once the completion record has been written.
    ///
    /// Timing, recording and `on_success` run in a task of their own, so a
    /// caller that stops waiting does not lose the record.
    pub async fn invoke_then<T, F, S>(
        &self,
        function_name: &str,
        call_id: &str,
        handler: F,
        on_success: S,
    ) -> CallOutcome<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ToolError>> + Send + 'static,
        S: FnOnce(&T) + Send + 'static,
    {
        let instrumentation = self.clone();
        let function_name = function_name.to_string();
        let call_id = call_id.to_string();

        let recorded = tokio::spawn(async move {
            let start = Instant::now();
            let result = match tokio::spawn(handler).await {
                Ok(result) => result,
                Err(e) => Err(join_error_to_tool_error(e)),
            };
            let elapsed = start.elapsed();

            let outcome = instrumentation.record(&function_name, &call_id, elapsed, result);
            if let CallOutcome::Success(value) = &outcome {
                on_success(value);
            }
            outcome
        });

        match recorded.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = join_error_to_tool_error(e);
                CallOutcome::Failure {
                    error_type: error.error_type(),
                    error_message: sanitize_error_message(&error.to_string()),
                }
            }
        }
    }

    fn record<T>(
        &self,
        function_name: &str,
        call_id: &str,
        elapsed: Duration,
        result: Result<T, ToolError>,
    ) -> CallOutcome<T> {
        let context = LogContext::new()
            .with_call_id(call_id)
            .with_function_name(function_name)
            .with_duration(elapsed);

        match result {
            Ok(value) => {
                log_info!(self.logger, context, "Function {function_name} completed");
                self.metrics
                    .record_function_call(function_name, CallStatus::Success, elapsed);
                CallOutcome::Success(value)
            }
            Err(error) => {
                let error_type = error.error_type();
                let error_message = sanitize_error_message(&error.to_string());
                log_error!(
                    self.logger,
                    context.with_error_type(error_type),
                    "Function {function_name} failed: {error_message}"
                );
                self.metrics
                    .record_function_call(function_name, CallStatus::Error, elapsed);
                self.metrics.record_error(function_name, error_type);
                CallOutcome::Failure {
                    error_type,
                    error_message,
                }
            }
        }
    }

    /// Wrap a tool once, compiling its parameter schema
    pub fn wrap(&self, tool: Arc<dyn Tool>) -> Result<InstrumentedTool, ToolError> {
        let description = tool.describe();
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        Ok(InstrumentedTool {
            name: description.name.clone(),
            tool,
            validator: Arc::new(validator),
            instrumentation: self.clone(),
        })
    }
}

fn join_error_to_tool_error(error: JoinError) -> ToolError {
    if error.is_panic() {
        let payload = error.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        ToolError::Panicked(message)
    } else {
        ToolError::ExecutionError("handler task was cancelled".to_string())
    }
}

/// A tool bound to its compiled schema and the shared instrumentation
pub struct InstrumentedTool {
    name: String,
    tool: Arc<dyn Tool>,
    validator: Arc<Validator>,
    instrumentation: Instrumentation,
}

impl InstrumentedTool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn describe(&self) -> ToolDescription {
        self.tool.describe()
    }

    /// Validate, execute and record one invocation; faults become the
    /// tool's fallback response.
    pub async fn invoke(&self, arguments: Value, context: CallContext) -> ToolResponse {
        let call_id = context.call_id().to_string();
        let tool = Arc::clone(&self.tool);
        let validator = Arc::clone(&self.validator);
        let followup = (Arc::clone(&self.tool), arguments.clone(), context.clone());

        let handler = async move {
            validate_arguments(&validator, &arguments)?;
            tool.execute(&arguments, &context).await
        };
        let after_success = move |response: &ToolResponse| {
            let (tool, arguments, context) = followup;
            tool.after_success(&arguments, &context, response);
        };

        self.instrumentation
            .invoke_then(&self.name, &call_id, handler, after_success)
            .await
            .unwrap_or_else(|| self.tool.fallback_response())
    }
}

impl std::fmt::Debug for InstrumentedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedTool")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn validate_arguments(validator: &Validator, arguments: &Value) -> Result<(), ToolError> {
    validator.validate(arguments).map_err(|errors| {
        let error_messages: Vec<String> = errors
            .map(|e| format!("At '{}': {}", e.instance_path, e))
            .collect();
        ToolError::ValidationError(error_messages.join("; "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::{Metric, SampleValue};
    use crate::testing::test_instrumentation;

    #[tokio::test]
    async fn test_success_produces_one_info_record_and_one_increment() {
        let (instrumentation, sink, metrics) = test_instrumentation();

        let outcome = instrumentation
            .invoke("get_order_status", "call-1", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, ToolError>("shipped")
            })
            .await;

        assert_eq!(outcome, CallOutcome::Success("shipped"));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "INFO");
        assert_eq!(records[0]["function_name"], "get_order_status");
        assert_eq!(records[0]["call_id"], "call-1");
        assert!(records[0].get("error_type").is_none());
        assert_eq!(
            metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "success"]),
            1.0
        );
        assert_eq!(
            metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "error"]),
            0.0
        );
    }

    #[tokio::test]
    async fn test_logged_duration_matches_histogram() {
        let (instrumentation, sink, metrics) = test_instrumentation();

        instrumentation
            .invoke("create_ticket", "call-2", async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, ToolError>(())
            })
            .await;

        let duration_ms = sink.records()[0]["duration_ms"].as_f64().unwrap();
        assert!(duration_ms >= 30.0);
        let observed = match metrics
            .sample(Metric::FunctionLatencySeconds, &["create_ticket"])
            .unwrap()
            .value
        {
            SampleValue::Histogram { count, sum } => {
                assert_eq!(count, 1);
                sum
            }
            other => panic!("unexpected sample {other:?}"),
        };
        assert!((observed * 1000.0 - duration_ms).abs() <= 0.01);
    }

    #[tokio::test]
    async fn test_failure_produces_one_error_record_and_error_metrics() {
        let (instrumentation, sink, metrics) = test_instrumentation();

        let outcome: CallOutcome<()> = instrumentation
            .invoke("get_order_status", "call-3", async {
                Err(ToolError::ExecutionError("order service token=abc123 refused".into()))
            })
            .await;

        assert_eq!(outcome.status(), CallStatus::Error);
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "ERROR");
        assert_eq!(records[0]["error_type"], "execution_failed");
        assert!(!records[0]["message"].as_str().unwrap().contains("abc123"));
        assert_eq!(
            metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "error"]),
            1.0
        );
        assert_eq!(
            metrics.counter_value(Metric::ErrorsTotal, &["get_order_status", "execution_failed"]),
            1.0
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let (instrumentation, sink, metrics) = test_instrumentation();

        let outcome: CallOutcome<()> = instrumentation
            .invoke("transfer_specialist", "call-4", async {
                if true {
                    panic!("department table missing");
                }
                Ok::<(), ToolError>(())
            })
            .await;

        match outcome {
            CallOutcome::Failure {
                error_type,
                error_message,
            } => {
                assert_eq!(error_type, "panic");
                assert!(error_message.contains("department table missing"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(sink.records()[0]["error_type"], "panic");
        assert_eq!(
            metrics.counter_value(Metric::ErrorsTotal, &["transfer_specialist", "panic"]),
            1.0
        );
    }

    #[tokio::test]
    async fn test_record_survives_abandoned_caller() {
        let (instrumentation, sink, metrics) = test_instrumentation();

        let invocation = instrumentation.invoke("get_order_status", "call-5", async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ToolError>("shipped")
        });
        let waited = tokio::time::timeout(Duration::from_millis(20), invocation).await;
        assert!(waited.is_err());
        assert!(sink.records().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["message"], "Function get_order_status completed");
        assert_eq!(records[0]["call_id"], "call-5");
        assert_eq!(
            metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "success"]),
            1.0
        );
    }

    #[tokio::test]
    async fn test_success_hook_runs_after_completion_record() {
        let (instrumentation, sink, _) = test_instrumentation();
        let logger = instrumentation.logger().clone();

        instrumentation
            .invoke_then(
                "create_ticket",
                "call-6",
                async { Ok::<_, ToolError>("TKT-1".to_string()) },
                move |ticket_id: &String| {
                    log_info!(logger, LogContext::new().with_ticket_id(ticket_id), "Ticket created");
                },
            )
            .await;

        let messages: Vec<_> = sink
            .records()
            .iter()
            .map(|r| r["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, vec!["Function create_ticket completed", "Ticket created"]);
    }

    #[tokio::test]
    async fn test_success_hook_skipped_on_failure() {
        let (instrumentation, sink, _) = test_instrumentation();
        let logger = instrumentation.logger().clone();

        instrumentation
            .invoke_then(
                "create_ticket",
                "call-7",
                async { Err::<(), _>(ToolError::ExecutionError("disk full".into())) },
                move |_: &()| {
                    log_info!(logger, LogContext::new(), "Ticket created");
                },
            )
            .await;

        assert!(sink.records_with_message("Ticket created").is_empty());
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_outcome_fallback() {
        let failure: CallOutcome<&str> = CallOutcome::Failure {
            error_type: "execution_failed",
            error_message: "x".into(),
        };
        assert!(!failure.is_success());
        assert_eq!(failure.unwrap_or_else(|| "fallback"), "fallback");
        assert_eq!(CallOutcome::Success("ok").unwrap_or_else(|| "fallback"), "ok");
    }
}
