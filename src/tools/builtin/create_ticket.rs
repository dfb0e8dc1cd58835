//! Support ticket creation tool

use crate::log_info;
use crate::observability::metrics::{LabelValue, MetricsRegistry};
use crate::observability::structured::{LogContext, StructuredLogger};
use crate::tools::{CallContext, Tool, ToolDescription, ToolError, ToolResponse};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Ticket priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl LabelValue for Priority {
    fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Ticket id from the local clock, `TKT-YYYYMMDDHHMMSS`
pub fn generate_ticket_id() -> String {
    format!("TKT-{}", Local::now().format("%Y%m%d%H%M%S"))
}

/// `create_ticket` tool
pub struct CreateTicketTool {
    logger: StructuredLogger,
    metrics: MetricsRegistry,
}

impl CreateTicketTool {
    pub const NAME: &'static str = "create_ticket";

    pub fn new(logger: StructuredLogger, metrics: MetricsRegistry) -> Self {
        Self { logger, metrics }
    }
}

#[async_trait]
impl Tool for CreateTicketTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: Self::NAME.to_string(),
            description: "Create a support ticket".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "issue": {"type": "string"},
                    "priority": {
                        "type": "string",
                        "enum": ["low", "medium", "high"]
                    }
                },
                "required": ["issue"]
            }),
            fillers: Vec::new(),
        }
    }

    async fn execute(
        &self,
        arguments: &Value,
        _context: &CallContext,
    ) -> Result<ToolResponse, ToolError> {
        if arguments.get("issue").and_then(Value::as_str).is_none() {
            return Err(ToolError::ValidationError("issue is required".to_string()));
        }
        let priority = parse_priority(arguments)?;
        let ticket_id = generate_ticket_id();

        let mut global_data = Map::new();
        global_data.insert("ticket_id".to_string(), json!(ticket_id));
        global_data.insert("ticket_priority".to_string(), json!(priority.label()));

        Ok(ToolResponse::new(format!("Created ticket {ticket_id}.")).update_global_data(global_data))
    }

    fn after_success(&self, arguments: &Value, context: &CallContext, response: &ToolResponse) {
        let Some(ticket_id) = response.global_data("ticket_id").and_then(Value::as_str) else {
            return;
        };
        let priority = parse_priority(arguments).unwrap_or_default();

        log_info!(
            self.logger,
            LogContext::new()
                .with_call_id(context.call_id())
                .with_ticket_id(ticket_id)
                .with_priority(priority.label()),
            "Ticket created"
        );
        self.metrics.record_ticket(&priority);
    }
}

fn parse_priority(arguments: &Value) -> Result<Priority, ToolError> {
    match arguments.get("priority") {
        None | Some(Value::Null) => Ok(Priority::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ToolError::ValidationError(format!("priority: {e}"))),
    }
}
