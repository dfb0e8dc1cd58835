//! The customer service agent
//!
//! Owns the agent configuration and the tool registry. Initialization
//! registers the builtin tools; only after it completes does the agent report
//! ready. The rendered configuration document is what the orchestrator loads
//! to drive the conversation.

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::observability::instrument::Instrumentation;
use crate::observability::metrics::MetricsRegistry;
use crate::observability::structured::{LogContext, StructuredLogger};
use crate::tools::builtin::{
    CreateTicketTool, OrderLookup, OrderStatusTool, SystemStatusTool, TransferTool,
};
use crate::tools::{CallContext, Tool, ToolDescription, ToolRegistry, ToolResponse};
use crate::{log_error, log_info};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Version of the rendered configuration document format
pub const DOCUMENT_VERSION: &str = "1.0.0";

/// What the health endpoints need to know about the agent
pub trait AgentStatus: Send + Sync {
    /// True once initialization completed without fault
    fn is_ready(&self) -> bool;

    /// Render the runtime configuration document
    fn render_configuration(&self) -> AgentResult<Value>;
}

pub struct Agent {
    config: AgentConfig,
    tools: ToolRegistry,
    logger: StructuredLogger,
    metrics: MetricsRegistry,
    ready: AtomicBool,
    init_lock: Mutex<()>,
}

impl Agent {
    pub fn new(config: AgentConfig, logger: StructuredLogger, metrics: MetricsRegistry) -> Self {
        let instrumentation = Instrumentation::new(logger.clone(), metrics.clone());
        Self {
            config,
            tools: ToolRegistry::new(instrumentation),
            logger,
            metrics,
            ready: AtomicBool::new(false),
            init_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.agent.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Validate the configuration and register the builtin tools.
    ///
    /// Calling this again after a successful run is a no-op. Concurrent
    /// callers are serialized; a failed run registers nothing.
    pub fn initialize(&self, orders: Arc<dyn OrderLookup>) -> AgentResult<()> {
        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_ready() {
            return Ok(());
        }

        log_info!(self.logger, LogContext::new(), "Agent initializing");

        if let Err(e) = self.register_tools(orders) {
            log_error!(
                self.logger,
                LogContext::new(),
                "Agent initialization failed: {}",
                e.sanitized()
            );
            return Err(e);
        }

        self.ready.store(true, Ordering::SeqCst);
        log_info!(self.logger, LogContext::new(), "Agent initialized successfully");
        Ok(())
    }

    fn register_tools(&self, orders: Arc<dyn OrderLookup>) -> AgentResult<()> {
        self.config.validate()?;

        let builtin: Vec<Arc<dyn Tool>> = vec![
            Arc::new(OrderStatusTool::new(orders)),
            Arc::new(CreateTicketTool::new(self.logger.clone(), self.metrics.clone())),
            Arc::new(TransferTool::new(self.logger.clone(), self.metrics.clone())),
            Arc::new(SystemStatusTool),
        ];
        self.tools.register_all(builtin)?;
        Ok(())
    }

    /// Invoke a tool by name. Always yields a response.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Value,
        context: CallContext,
    ) -> ToolResponse {
        self.tools.dispatch(tool_name, arguments, context).await
    }

    pub fn tool_descriptions(&self) -> Vec<ToolDescription> {
        self.tools.descriptions()
    }

    fn render_functions(&self) -> Vec<Value> {
        self.tool_descriptions()
            .into_iter()
            .map(|description| {
                let mut function = json!({
                    "function": description.name,
                    "description": description.description,
                    "parameters": description.parameters,
                });
                if !description.fillers.is_empty() {
                    function["fillers"] = json!({ "en-US": description.fillers });
                }
                function
            })
            .collect()
    }
}

impl AgentStatus for Agent {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn render_configuration(&self) -> AgentResult<Value> {
        if !self.is_ready() {
            return Err(AgentError::internal_error(format!(
                "agent '{}' has not been initialized",
                self.name()
            )));
        }

        Ok(json!({
            "version": DOCUMENT_VERSION,
            "sections": {
                "main": [
                    { "answer": {} },
                    {
                        "ai": {
                            "prompt": { "pom": self.config.prompt },
                            "languages": self.config.languages,
                            "SWAIG": { "functions": self.render_functions() }
                        }
                    }
                ]
            }
        }))
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentSection;
    use crate::testing::{test_instrumentation, FailingOrderLookup};
    use crate::tools::builtin::SimulatedOrderLookup;
    use std::time::Duration;

    fn agent(config: AgentConfig) -> (Agent, Arc<crate::testing::MemorySink>) {
        let (instrumentation, sink, metrics) = test_instrumentation();
        (
            Agent::new(config, instrumentation.logger().clone(), metrics),
            sink,
        )
    }

    #[test]
    fn test_initialize_registers_tools_and_logs_lifecycle() {
        let (agent, sink) = agent(AgentConfig::default());
        assert!(!agent.is_ready());

        agent
            .initialize(Arc::new(SimulatedOrderLookup::new(Duration::ZERO)))
            .unwrap();

        assert!(agent.is_ready());
        assert_eq!(
            agent.tools().list_tools(),
            vec![
                "get_order_status",
                "create_ticket",
                "transfer_specialist",
                "system_status"
            ]
        );
        let messages: Vec<_> = sink
            .records()
            .iter()
            .map(|r| r["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, vec!["Agent initializing", "Agent initialized successfully"]);
    }

    #[test]
    fn test_initialize_twice_is_noop() {
        let (agent, _) = agent(AgentConfig::default());
        let orders: Arc<dyn OrderLookup> = Arc::new(FailingOrderLookup);

        agent.initialize(orders.clone()).unwrap();
        agent.initialize(orders).unwrap();

        assert_eq!(agent.tools().list_tools().len(), 4);
    }

    #[test]
    fn test_concurrent_initialize_runs_once() {
        let (agent, sink) = agent(AgentConfig::default());
        let orders: Arc<dyn OrderLookup> = Arc::new(FailingOrderLookup);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let orders = orders.clone();
                    let agent = &agent;
                    scope.spawn(move || agent.initialize(orders))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        });

        assert_eq!(agent.tools().list_tools().len(), 4);
        assert_eq!(sink.records_with_message("Agent initializing").len(), 1);
        assert!(sink.records().iter().all(|r| r["level"] == "INFO"));
    }

    #[test]
    fn test_invalid_config_leaves_agent_not_ready() {
        let config = AgentConfig {
            agent: AgentSection {
                name: "bad name!".to_string(),
            },
            ..AgentConfig::default()
        };
        let (agent, sink) = agent(config);

        let result = agent.initialize(Arc::new(FailingOrderLookup));

        assert!(matches!(result, Err(AgentError::ConfigError(_))));
        assert!(!agent.is_ready());
        assert!(agent.render_configuration().is_err());
        assert_eq!(sink.records().last().unwrap()["level"], "ERROR");
    }

    #[test]
    fn test_render_configuration() {
        let (agent, _) = agent(AgentConfig::default());
        agent.initialize(Arc::new(FailingOrderLookup)).unwrap();

        let document = agent.render_configuration().unwrap();
        let ai = &document["sections"]["main"][1]["ai"];

        assert_eq!(document["version"], DOCUMENT_VERSION);
        assert_eq!(ai["prompt"]["pom"][0]["title"], "Role");
        assert_eq!(ai["prompt"]["pom"][1]["bullets"][2], "Transfer to specialists when needed");
        assert_eq!(ai["languages"][0]["code"], "en-US");
        let functions = ai["SWAIG"]["functions"].as_array().unwrap();
        assert_eq!(functions.len(), 4);
        assert_eq!(functions[0]["function"], "get_order_status");
        assert_eq!(functions[0]["fillers"]["en-US"][0], "Looking up your order...");
        assert!(functions[3].get("fillers").is_none());
    }
}
