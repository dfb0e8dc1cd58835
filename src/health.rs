//! Health check system for production monitoring
//!
//! Liveness depends on nothing. Readiness mirrors agent initialization.
//! Detailed health runs every registered [`HealthProbe`] fresh on each poll
//! and folds the results into one verdict: `healthy` when every probe that is
//! not `unavailable` is healthy, `degraded` otherwise. Probe faults (panics
//! included) become `unhealthy` checks and never escape.

use crate::agent::AgentStatus;
use crate::error::sanitize_error_message;
use crate::observability::metrics::MetricsRegistry;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Status of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
    /// The subsystem was never activated; ignored by the rollup
    Unavailable,
}

/// Overall verdict of a detailed health poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Failed(String),
    #[error("probe panicked: {0}")]
    Panicked(String),
}

/// Result of one check as reported in `checks`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn new(status: ProbeStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn from_error(error: &ProbeError) -> Self {
        Self {
            status: ProbeStatus::Unhealthy,
            error: Some(sanitize_error_message(&error.to_string())),
        }
    }
}

/// A named subsystem check
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> Result<ProbeStatus, ProbeError>;
}

/// `agent`: healthy once initialization completed
pub struct AgentProbe {
    agent: Arc<dyn AgentStatus>,
}

impl AgentProbe {
    pub fn new(agent: Arc<dyn AgentStatus>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl HealthProbe for AgentProbe {
    fn name(&self) -> &str {
        "agent"
    }

    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        if self.agent.is_ready() {
            Ok(ProbeStatus::Healthy)
        } else {
            Err(ProbeError::Failed("agent not initialized".to_string()))
        }
    }
}

/// `metrics`: unavailable when the registry was never activated
pub struct MetricsProbe {
    metrics: MetricsRegistry,
}

impl MetricsProbe {
    pub fn new(metrics: MetricsRegistry) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl HealthProbe for MetricsProbe {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        if self.metrics.is_active() {
            Ok(ProbeStatus::Healthy)
        } else {
            Ok(ProbeStatus::Unavailable)
        }
    }
}

/// `swml_generation`: renders the agent's configuration document
pub struct ConfigurationProbe {
    agent: Arc<dyn AgentStatus>,
}

impl ConfigurationProbe {
    pub fn new(agent: Arc<dyn AgentStatus>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl HealthProbe for ConfigurationProbe {
    fn name(&self) -> &str {
        "swml_generation"
    }

    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        self.agent
            .render_configuration()
            .map(|_| ProbeStatus::Healthy)
            .map_err(|e| ProbeError::Failed(e.sanitized()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub timestamp: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailedHealth {
    pub status: OverallStatus,
    pub timestamp: String,
    pub checks: BTreeMap<String, CheckResult>,
}

/// Fold individual checks into one verdict
pub fn rollup<'a>(checks: impl IntoIterator<Item = &'a CheckResult>) -> OverallStatus {
    let all_healthy = checks
        .into_iter()
        .filter(|check| check.status != ProbeStatus::Unavailable)
        .all(|check| check.status == ProbeStatus::Healthy);

    if all_healthy {
        OverallStatus::Healthy
    } else {
        OverallStatus::Degraded
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Answers liveness, readiness and detailed health polls
pub struct HealthAggregator {
    version: String,
    agent: Arc<dyn AgentStatus>,
    probes: Vec<Arc<dyn HealthProbe>>,
}

impl HealthAggregator {
    /// Aggregator with the standard `agent`, `metrics` and `swml_generation` probes
    pub fn new(version: impl Into<String>, agent: Arc<dyn AgentStatus>, metrics: MetricsRegistry) -> Self {
        let probes: Vec<Arc<dyn HealthProbe>> = vec![
            Arc::new(AgentProbe::new(agent.clone())),
            Arc::new(MetricsProbe::new(metrics)),
            Arc::new(ConfigurationProbe::new(agent.clone())),
        ];
        Self::with_probes(version, agent, probes)
    }

    pub fn with_probes(
        version: impl Into<String>,
        agent: Arc<dyn AgentStatus>,
        probes: Vec<Arc<dyn HealthProbe>>,
    ) -> Self {
        Self {
            version: version.into(),
            agent,
            probes,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn liveness(&self) -> Liveness {
        Liveness {
            status: "healthy",
            timestamp: now(),
            version: self.version.clone(),
        }
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            ready: self.agent.is_ready(),
        }
    }

    /// Run every probe and roll the results up
    pub async fn detailed_health(&self) -> DetailedHealth {
        let handles: Vec<_> = self
            .probes
            .iter()
            .map(|probe| {
                let probe = Arc::clone(probe);
                let name = probe.name().to_string();
                (name, tokio::spawn(async move { probe.check().await }))
            })
            .collect();

        let mut checks = BTreeMap::new();
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(Ok(status)) => CheckResult::new(status),
                Ok(Err(e)) => {
                    warn!(probe = %name, "Health probe failed: {}", e);
                    CheckResult::from_error(&e)
                }
                Err(join_error) => {
                    let e = ProbeError::Panicked(join_error.to_string());
                    warn!(probe = %name, "Health probe aborted: {}", e);
                    CheckResult::from_error(&e)
                }
            };
            checks.insert(name, result);
        }

        let status = rollup(checks.values());
        debug!(?status, checks = checks.len(), "Detailed health computed");

        DetailedHealth {
            status,
            timestamp: now(),
            checks,
        }
    }
}
