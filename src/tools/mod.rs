//! Tool system
//!
//! A tool is a named handler with a JSON-schema parameter contract. Tools are
//! wrapped by [`Instrumentation::wrap`] once, when they are registered, and
//! every dispatch goes through that wrapper.

use crate::observability::instrument::{InstrumentedTool, Instrumentation};
use crate::observability::structured::LogContext;
use crate::{log_error, tool_span};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::Instrument;

pub mod builtin;

/// Response given when a handler fails and has no fallback of its own
pub const DEFAULT_FALLBACK: &str =
    "I'm sorry, I ran into a problem on my end. Can I help with something else?";

/// Call id used when the orchestrator does not send one
pub const UNKNOWN_CALL_ID: &str = "unknown";

/// Tool interface
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description, parameter schema and filler utterances
    fn describe(&self) -> ToolDescription;

    /// Run the handler. `arguments` has already been validated against the
    /// schema from [`Tool::describe`].
    async fn execute(
        &self,
        arguments: &Value,
        context: &CallContext,
    ) -> Result<ToolResponse, ToolError>;

    /// Caller-safe response used when [`Tool::execute`] fails
    fn fallback_response(&self) -> ToolResponse {
        ToolResponse::new(DEFAULT_FALLBACK)
    }

    /// Business events for a successful call. Runs once the invocation's
    /// completion record has been written.
    fn after_success(&self, _arguments: &Value, _context: &CallContext, _response: &ToolResponse) {}
}

/// Tool descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fillers: Vec<String>,
}

/// Per-invocation context sent by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallContext {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CallContext {
    pub fn with_call_id(call_id: impl Into<String>) -> Self {
        Self {
            call_id: Some(call_id.into()),
            extra: Map::new(),
        }
    }

    /// Call id, or `"unknown"` when absent
    pub fn call_id(&self) -> &str {
        self.call_id.as_deref().unwrap_or(UNKNOWN_CALL_ID)
    }
}

/// Side-channel directive returned alongside the text response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAction {
    /// Patch applied to the call's shared global data
    SetGlobalData(Map<String, Value>),
    /// Hand the call to another destination
    Transfer {
        dest: String,
        farewell: String,
        #[serde(rename = "final")]
        final_transfer: bool,
    },
}

/// What a tool returns to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<ToolAction>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub post_process: bool,
}

impl ToolResponse {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            action: Vec::new(),
            post_process: false,
        }
    }

    pub fn with_post_process(mut self) -> Self {
        self.post_process = true;
        self
    }

    pub fn update_global_data(mut self, data: Map<String, Value>) -> Self {
        self.action.push(ToolAction::SetGlobalData(data));
        self
    }

    pub fn transfer(mut self, dest: impl Into<String>, farewell: impl Into<String>, final_transfer: bool) -> Self {
        self.action.push(ToolAction::Transfer {
            dest: dest.into(),
            farewell: farewell.into(),
            final_transfer,
        });
        self
    }

    /// Value set for `key` by a global-data action, if any
    pub fn global_data(&self, key: &str) -> Option<&Value> {
        self.action.iter().find_map(|action| match action {
            ToolAction::SetGlobalData(data) => data.get(key),
            _ => None,
        })
    }

    /// First transfer directive, if any
    pub fn transfer_target(&self) -> Option<&str> {
        self.action.iter().find_map(|action| match action {
            ToolAction::Transfer { dest, .. } => Some(dest.as_str()),
            _ => None,
        })
    }
}

/// Tool system errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
    #[error("Tool panicked: {0}")]
    Panicked(String),
}

impl ToolError {
    /// Bounded classification used as the `error_type` log field and metric label
    pub fn error_type(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::DuplicateTool(_) => "duplicate_tool",
            ToolError::ValidationError(_) => "invalid_arguments",
            ToolError::SchemaError(_) => "schema_error",
            ToolError::ExecutionError(_) => "execution_failed",
            ToolError::Panicked(_) => "panic",
        }
    }
}

/// Maps tool names to their instrumented handlers
pub struct ToolRegistry {
    instrumentation: Instrumentation,
    tools: RwLock<HashMap<String, Arc<InstrumentedTool>>>,
    order: RwLock<Vec<String>>,
}

impl ToolRegistry {
    pub fn new(instrumentation: Instrumentation) -> Self {
        Self {
            instrumentation,
            tools: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Wrap and register a tool
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        self.register_all(vec![tool])
    }

    /// Wrap and register a set of tools. Nothing is registered unless every
    /// tool wraps and every name is free.
    pub fn register_all(&self, tools: Vec<Arc<dyn Tool>>) -> Result<(), ToolError> {
        let instrumented = tools
            .into_iter()
            .map(|tool| self.instrumentation.wrap(tool))
            .collect::<Result<Vec<_>, _>>()?;

        let mut registered = self
            .tools
            .write()
            .map_err(|_| ToolError::ExecutionError("tool registry lock poisoned".to_string()))?;
        let mut names = HashSet::new();
        for tool in &instrumented {
            if registered.contains_key(tool.name()) || !names.insert(tool.name()) {
                return Err(ToolError::DuplicateTool(tool.name().to_string()));
            }
        }
        let mut order = self
            .order
            .write()
            .map_err(|_| ToolError::ExecutionError("tool registry lock poisoned".to_string()))?;

        for tool in instrumented {
            let name = tool.name().to_string();
            order.push(name.clone());
            registered.insert(name, Arc::new(tool));
        }
        Ok(())
    }

    fn get(&self, tool_name: &str) -> Option<Arc<InstrumentedTool>> {
        self.tools
            .read()
            .ok()
            .and_then(|tools| tools.get(tool_name).cloned())
    }

    /// Get tool description
    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.get(tool_name).map(|tool| tool.describe())
    }

    /// Descriptions in registration order
    pub fn descriptions(&self) -> Vec<ToolDescription> {
        self.list_tools()
            .iter()
            .filter_map(|name| self.describe_tool(name))
            .collect()
    }

    /// Registered tool names in registration order
    pub fn list_tools(&self) -> Vec<String> {
        self.order
            .read()
            .map(|order| order.clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.list_tools().is_empty()
    }

    /// Dispatch one invocation. Always returns a response.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Value,
        context: CallContext,
    ) -> ToolResponse {
        let span = tool_span!(tool = %tool_name, call_id = %context.call_id());

        match self.get(tool_name) {
            Some(tool) => tool.invoke(arguments, context).instrument(span).await,
            None => {
                let error = ToolError::UnknownTool(tool_name.to_string());
                let log_context = LogContext::new()
                    .with_call_id(context.call_id())
                    .with_function_name(tool_name)
                    .with_error_type(error.error_type());
                log_error!(
                    self.instrumentation.logger(),
                    log_context,
                    "Dispatch failed: {error}"
                );
                ToolResponse::new(DEFAULT_FALLBACK)
            }
        }
    }
}
