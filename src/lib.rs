//! Observable customer service agent
//!
//! Every tool invocation triggered by the voice orchestrator is timed, logged
//! as one fixed-schema JSON record and counted in Prometheus metrics. Health,
//! readiness and detailed-health endpoints report on the agent and its
//! subsystems.
//!
//! # Overview
//!
//! - [`observability::structured`]: single-line JSON records with an
//!   allow-listed context
//! - [`observability::metrics`]: the fixed instrument set behind a live or
//!   no-op backend
//! - [`observability::instrument`]: the wrapper tying both to each invocation
//! - [`tools`]: tool registry and the builtin customer service tools
//! - [`health`]: probes and the health rollup
//! - [`server`]: the warp HTTP surface
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use observable_agent::agent::Agent;
//! use observable_agent::config::AgentConfig;
//! use observable_agent::observability::{MetricsRegistry, StructuredLogger};
//! use observable_agent::tools::builtin::SimulatedOrderLookup;
//! use observable_agent::tools::CallContext;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> observable_agent::AgentResult<()> {
//! let metrics = MetricsRegistry::start("observable-agent", true);
//! let agent = Agent::new(AgentConfig::default(), StructuredLogger::stderr(), metrics);
//! agent.initialize(Arc::new(SimulatedOrderLookup::default()))?;
//!
//! let response = agent
//!     .dispatch("get_order_status", json!({"order_id": "A1"}), CallContext::with_call_id("c-1"))
//!     .await;
//! assert_eq!(response.response, "Order A1: shipped");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod health;
pub mod observability;
pub mod server;
pub mod testing;
pub mod tools;

pub use agent::{Agent, AgentStatus};
pub use config::{AgentConfig, ConfigError, ServerConfig};
pub use error::{AgentError, AgentResult};
pub use health::{HealthAggregator, HealthProbe, OverallStatus, ProbeStatus};
pub use observability::{Instrumentation, MetricsRegistry, StructuredLogger};
pub use tools::{Tool, ToolDescription, ToolError, ToolRegistry, ToolResponse};
