//! System status tool

use crate::tools::{CallContext, Tool, ToolDescription, ToolError, ToolResponse};
use async_trait::async_trait;
use serde_json::{json, Value};

/// `system_status` tool
#[derive(Debug, Default)]
pub struct SystemStatusTool;

impl SystemStatusTool {
    pub const NAME: &'static str = "system_status";
}

#[async_trait]
impl Tool for SystemStatusTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: Self::NAME.to_string(),
            description: "Get system status".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
            fillers: Vec::new(),
        }
    }

    async fn execute(
        &self,
        _arguments: &Value,
        _context: &CallContext,
    ) -> Result<ToolResponse, ToolError> {
        Ok(ToolResponse::new("All systems operational."))
    }
}
