//! Order status lookup tool

use crate::tools::{CallContext, Tool, ToolDescription, ToolError, ToolResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const ORDER_STATUS_FALLBACK: &str =
    "I'm having trouble looking up that order. Can I help with something else?";

/// Source of order status information
#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn status(&self, order_id: &str) -> Result<String, ToolError>;
}

/// Stand-in order service: waits, then reports every order as shipped
#[derive(Debug, Clone)]
pub struct SimulatedOrderLookup {
    delay: Duration,
}

impl SimulatedOrderLookup {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedOrderLookup {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl OrderLookup for SimulatedOrderLookup {
    async fn status(&self, _order_id: &str) -> Result<String, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok("shipped".to_string())
    }
}

/// `get_order_status` tool
pub struct OrderStatusTool {
    lookup: Arc<dyn OrderLookup>,
}

impl OrderStatusTool {
    pub const NAME: &'static str = "get_order_status";

    pub fn new(lookup: Arc<dyn OrderLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl Tool for OrderStatusTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: Self::NAME.to_string(),
            description: "Look up order status".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "string"}
                },
                "required": ["order_id"]
            }),
            fillers: vec!["Looking up your order...".to_string()],
        }
    }

    async fn execute(
        &self,
        arguments: &Value,
        _context: &CallContext,
    ) -> Result<ToolResponse, ToolError> {
        let order_id = arguments
            .get("order_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::ValidationError("order_id is required".to_string()))?;

        let status = self.lookup.status(order_id).await?;

        Ok(ToolResponse::new(format!("Order {order_id}: {status}")))
    }

    fn fallback_response(&self) -> ToolResponse {
        ToolResponse::new(ORDER_STATUS_FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_reports_shipped() {
        let tool = OrderStatusTool::new(Arc::new(SimulatedOrderLookup::new(Duration::ZERO)));

        let response = tool
            .execute(&json!({"order_id": "A1"}), &CallContext::default())
            .await
            .unwrap();

        assert_eq!(response.response, "Order A1: shipped");
    }

    #[tokio::test]
    async fn test_simulated_lookup_waits() {
        let lookup = SimulatedOrderLookup::new(Duration::from_millis(25));
        let start = std::time::Instant::now();

        lookup.status("A1").await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_description() {
        let tool = OrderStatusTool::new(Arc::new(SimulatedOrderLookup::default()));
        let description = tool.describe();

        assert_eq!(description.name, "get_order_status");
        assert_eq!(description.fillers, vec!["Looking up your order..."]);
        assert_eq!(description.parameters["required"][0], "order_id");
        assert_eq!(tool.fallback_response().response, ORDER_STATUS_FALLBACK);
    }
}
