//! Specialist transfer tool

use crate::log_info;
use crate::observability::metrics::{LabelValue, MetricsRegistry};
use crate::observability::structured::{LogContext, StructuredLogger};
use crate::tools::{CallContext, Tool, ToolDescription, ToolError, ToolResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const FAREWELL: &str = "Goodbye!";

/// Department a call can be handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    Sales,
    Support,
    Billing,
}

impl LabelValue for Department {
    fn label(&self) -> &'static str {
        match self {
            Department::Sales => "sales",
            Department::Support => "support",
            Department::Billing => "billing",
        }
    }
}

impl Department {
    /// Route of the agent serving this department
    pub fn route(&self) -> String {
        format!("/agents/{}", self.label())
    }
}

/// `transfer_specialist` tool
pub struct TransferTool {
    logger: StructuredLogger,
    metrics: MetricsRegistry,
}

impl TransferTool {
    pub const NAME: &'static str = "transfer_specialist";

    pub fn new(logger: StructuredLogger, metrics: MetricsRegistry) -> Self {
        Self { logger, metrics }
    }
}

#[async_trait]
impl Tool for TransferTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: Self::NAME.to_string(),
            description: "Transfer to specialist".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "department": {
                        "type": "string",
                        "enum": ["sales", "support", "billing"]
                    }
                },
                "required": ["department"]
            }),
            fillers: Vec::new(),
        }
    }

    async fn execute(
        &self,
        arguments: &Value,
        _context: &CallContext,
    ) -> Result<ToolResponse, ToolError> {
        let department = parse_department(arguments)?;

        Ok(
            ToolResponse::new(format!("Transferring to {}.", department.label()))
                .with_post_process()
                .transfer(department.route(), FAREWELL, true),
        )
    }

    fn after_success(&self, arguments: &Value, context: &CallContext, _response: &ToolResponse) {
        let Ok(department) = parse_department(arguments) else {
            return;
        };

        log_info!(
            self.logger,
            LogContext::new()
                .with_call_id(context.call_id())
                .with_department(department.label()),
            "Transfer initiated"
        );
        self.metrics.record_transfer(&department);
    }
}

fn parse_department(arguments: &Value) -> Result<Department, ToolError> {
    arguments
        .get("department")
        .cloned()
        .ok_or_else(|| ToolError::ValidationError("department is required".to_string()))
        .and_then(|value| {
            serde_json::from_value(value)
                .map_err(|e| ToolError::ValidationError(format!("department: {e}")))
        })
}
