//! Mock implementations for testing
//!
//! In-memory log sink, canned tools, failing order lookups, a stub agent
//! status and failing health probes, so tests run without a real order
//! service or process stderr.

use crate::agent::AgentStatus;
use crate::error::{AgentError, AgentResult};
use crate::health::{HealthProbe, ProbeError, ProbeStatus};
use crate::observability::instrument::Instrumentation;
use crate::observability::metrics::MetricsRegistry;
use crate::observability::structured::{LogSink, StructuredLogger};
use crate::tools::builtin::OrderLookup;
use crate::tools::{CallContext, Tool, ToolDescription, ToolError, ToolResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Log sink that keeps every line in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw lines in write order
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Lines parsed as JSON; lines that are not JSON are skipped
    pub fn records(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Records whose `message` equals `message`
    pub fn records_with_message(&self, message: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|record| record["message"] == message)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Instrumentation writing to a fresh [`MemorySink`] with live metrics
pub fn test_instrumentation() -> (Instrumentation, Arc<MemorySink>, MetricsRegistry) {
    let sink = Arc::new(MemorySink::new());
    let logger = StructuredLogger::new(sink.clone());
    let metrics = MetricsRegistry::live("observable-agent").expect("metrics backend should build");
    (Instrumentation::new(logger, metrics.clone()), sink, metrics)
}

/// Tool that always answers with the same text
#[derive(Debug, Clone)]
pub struct StaticTool {
    name: String,
    response: String,
    parameters: Value,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: response.into(),
            parameters: json!({"type": "object"}),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: format!("Static tool {}", self.name),
            parameters: self.parameters.clone(),
            fillers: Vec::new(),
        }
    }

    async fn execute(
        &self,
        _arguments: &Value,
        _context: &CallContext,
    ) -> Result<ToolResponse, ToolError> {
        Ok(ToolResponse::new(self.response.clone()))
    }
}

/// Order service that is always down
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingOrderLookup;

#[async_trait]
impl OrderLookup for FailingOrderLookup {
    async fn status(&self, order_id: &str) -> Result<String, ToolError> {
        Err(ToolError::ExecutionError(format!(
            "order service unreachable while looking up {order_id}"
        )))
    }
}

/// Order service that panics mid-lookup
#[derive(Debug, Default, Clone, Copy)]
pub struct PanickingOrderLookup;

#[async_trait]
impl OrderLookup for PanickingOrderLookup {
    async fn status(&self, _order_id: &str) -> Result<String, ToolError> {
        panic!("order cache corrupted");
    }
}

/// Agent status with fixed answers
#[derive(Debug, Clone, Default)]
pub struct StubAgentStatus {
    ready: bool,
    render_failure: Option<String>,
}

impl StubAgentStatus {
    pub fn ready() -> Self {
        Self {
            ready: true,
            render_failure: None,
        }
    }

    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn with_render_failure(mut self, message: impl Into<String>) -> Self {
        self.render_failure = Some(message.into());
        self
    }
}

impl AgentStatus for StubAgentStatus {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn render_configuration(&self) -> AgentResult<Value> {
        match &self.render_failure {
            Some(message) => Err(AgentError::internal_error(message.clone())),
            None => Ok(json!({"version": "1.0.0", "sections": {"main": []}})),
        }
    }
}

/// Probe that always reports a fault
#[derive(Debug, Clone)]
pub struct FailingProbe {
    name: String,
    message: String,
}

impl FailingProbe {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for FailingProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        Err(ProbeError::Failed(self.message.clone()))
    }
}

/// Probe that panics when checked
#[derive(Debug, Clone)]
pub struct PanickingProbe {
    name: String,
}

impl PanickingProbe {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl HealthProbe for PanickingProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        panic!("probe {} exploded", self.name);
    }
}
