//! HTTP surface
//!
//! The primary port serves health, readiness, metrics info, tool invocation,
//! the orchestrator webhooks, the tool listing and the configuration
//! document. The metrics port serves the Prometheus text exposition. Neither
//! surface turns an internal fault into a 500.

use crate::agent::{Agent, AgentStatus};
use crate::config::ServerConfig;
use crate::error::{AgentError, AgentResult};
use crate::health::HealthAggregator;
use crate::log_info;
use crate::observability::metrics::{CallStatus, MetricsRegistry};
use crate::observability::structured::{LogContext, StructuredLogger};
use crate::tools::CallContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

/// Largest request body accepted on any POST route
pub const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Content type of the Prometheus text exposition
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Everything the route handlers share
pub struct AppState {
    pub agent: Arc<Agent>,
    pub health: HealthAggregator,
    pub metrics_port: u16,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, server: &ServerConfig) -> Self {
        let status: Arc<dyn AgentStatus> = agent.clone();
        let health = HealthAggregator::new(server.version.clone(), status, agent.metrics().clone());
        Self {
            agent,
            health,
            metrics_port: server.metrics_port,
        }
    }

    fn logger(&self) -> &StructuredLogger {
        self.agent.logger()
    }

    fn metrics(&self) -> &MetricsRegistry {
        self.agent.metrics()
    }
}

/// Body of `GET /metrics/info`
#[derive(Debug, Serialize)]
pub struct MetricsInfo {
    pub metrics_available: bool,
    pub metrics_port: Option<u16>,
    pub available_metrics: Vec<String>,
}

/// Tool invocation sent by the orchestrator to `POST /swaig`
#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    pub function: String,
    #[serde(default)]
    pub argument: Value,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCallRequest {
    /// The arguments mapping. Accepts a bare object or the orchestrator's
    /// `{"parsed": [{...}]}` envelope; anything else counts as no arguments.
    pub fn arguments(&self) -> Value {
        match &self.argument {
            Value::Object(map) => match map.get("parsed") {
                Some(Value::Array(parsed)) => match parsed.first() {
                    Some(Value::Object(inner)) => Value::Object(inner.clone()),
                    _ => json!({}),
                },
                _ => Value::Object(map.clone()),
            },
            _ => json!({}),
        }
    }

    pub fn context(&self) -> CallContext {
        CallContext {
            call_id: self.call_id.clone(),
            extra: self.extra.clone(),
        }
    }
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::bytes())
}

/// All routes served on the primary port
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_health);

    let detailed = warp::path!("health" / "detailed")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_detailed_health);

    let ready = warp::path!("ready")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_ready);

    let metrics_info = warp::path!("metrics" / "info")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_metrics_info);

    let swaig = warp::path!("swaig")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handle_tool_call);

    let debug = warp::path!("debug")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handle_debug);

    let post_prompt = warp::path!("post_prompt")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handle_post_prompt);

    let tools = warp::path!("tools")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_tools);

    let document = warp::path!("swml")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_document);

    health
        .or(detailed)
        .or(ready)
        .or(metrics_info)
        .or(swaig)
        .or(debug)
        .or(post_prompt)
        .or(tools)
        .or(document)
}

/// `GET /metrics` on the metrics port
pub fn metrics_routes(
    metrics: MetricsRegistry,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("metrics")
        .and(warp::get())
        .and(warp::any().map(move || metrics.clone()))
        .and_then(handle_metrics_text)
}

async fn handle_health(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&state.health.liveness()))
}

async fn handle_detailed_health(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&state.health.detailed_health().await))
}

async fn handle_ready(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let readiness = state.health.readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(warp::reply::with_status(warp::reply::json(&readiness), status))
}

async fn handle_metrics_info(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let metrics = state.metrics();
    let available = metrics.is_active();
    Ok(warp::reply::json(&MetricsInfo {
        metrics_available: available,
        metrics_port: available.then_some(state.metrics_port),
        available_metrics: metrics.available_metrics(),
    }))
}

async fn handle_tool_call(body: Bytes, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let request: ToolCallRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected malformed tool call: {}", e);
            return Ok(warp::reply::with_status(
                warp::reply::json(&json!({"error": format!("invalid tool call: {e}")})),
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    let response = state
        .agent
        .dispatch(&request.function, request.arguments(), request.context())
        .await;

    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        StatusCode::OK,
    ))
}

/// Log one webhook record with the allow-listed fields of its payload
fn log_webhook(logger: &StructuredLogger, name: &str, body: &[u8]) {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(payload)) => {
            log_info!(logger, LogContext::from_payload(&payload), "{name} received");
        }
        Ok(_) => {
            log_info!(logger, LogContext::new(), "{name} received (payload is not an object)");
        }
        Err(_) => {
            log_info!(logger, LogContext::new(), "{name} received (body is not JSON)");
        }
    }
}

fn received() -> warp::reply::Json {
    warp::reply::json(&json!({"status": "received"}))
}

async fn handle_debug(body: Bytes, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    log_webhook(state.logger(), "Debug webhook", &body);
    Ok(received())
}

async fn handle_post_prompt(body: Bytes, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    log_webhook(state.logger(), "Post-prompt summary", &body);
    state.metrics().record_call(CallStatus::Success);
    Ok(received())
}

async fn handle_tools(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&state.agent.tool_descriptions()))
}

async fn handle_document(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    match state.agent.render_configuration() {
        Ok(document) => Ok(warp::reply::with_status(
            warp::reply::json(&document),
            StatusCode::OK,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({"error": e.sanitized()})),
            StatusCode::SERVICE_UNAVAILABLE,
        )),
    }
}

async fn handle_metrics_text(metrics: MetricsRegistry) -> Result<impl Reply, Infallible> {
    let (body, status) = match metrics.encode_text() {
        Ok(text) => (text, StatusCode::OK),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (String::new(), StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    Ok(warp::reply::with_status(
        warp::reply::with_header(body, "content-type", PROMETHEUS_CONTENT_TYPE),
        status,
    ))
}

fn shutdown_future(mut shutdown: watch::Receiver<bool>) -> impl std::future::Future<Output = ()> {
    async move {
        loop {
            let stopping = *shutdown.borrow();
            if stopping || shutdown.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Bind the metrics port. A bind failure is logged and the agent carries on.
pub fn spawn_metrics_server(
    addr: SocketAddr,
    metrics: MetricsRegistry,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    match warp::serve(metrics_routes(metrics))
        .try_bind_with_graceful_shutdown(addr, shutdown_future(shutdown))
    {
        Ok((bound, server)) => {
            info!("Metrics server started on {}", bound);
            Some(tokio::spawn(server))
        }
        Err(e) => {
            warn!("Could not start metrics server on {}: {}", addr, e);
            None
        }
    }
}

/// Serve the primary routes (and the metrics port when metrics are active)
/// until `shutdown` flips to true.
pub async fn serve(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> AgentResult<()> {
    let listen_addr = config.listen_addr()?;

    let metrics_task = if state.metrics().is_active() {
        let metrics_addr = config.metrics_addr()?;
        spawn_metrics_server(metrics_addr, state.metrics().clone(), shutdown.clone())
    } else {
        info!("Metrics inactive, not starting metrics server");
        None
    };

    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(listen_addr, shutdown_future(shutdown))
        .map_err(|e| AgentError::server_error(format!("failed to bind {listen_addr}: {e}")))?;

    info!("Agent server listening on {}", bound);
    server.await;
    info!("Agent server stopped");

    if let Some(task) = metrics_task {
        if let Err(e) = task.await {
            warn!("Metrics server task ended abnormally: {}", e);
        }
    }

    Ok(())
}
