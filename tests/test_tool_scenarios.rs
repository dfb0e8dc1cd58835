//! End-to-end tool invocation tests
//!
//! Each test drives the agent through its public dispatch path and checks the
//! observable outcome: the response, the structured records and the metrics.

use observable_agent::agent::Agent;
use observable_agent::config::AgentConfig;
use observable_agent::observability::{Metric, MetricsRegistry, StructuredLogger};
use observable_agent::testing::{FailingOrderLookup, MemorySink, PanickingOrderLookup};
use observable_agent::tools::builtin::{OrderLookup, SimulatedOrderLookup, ORDER_STATUS_FALLBACK};
use observable_agent::tools::{CallContext, ToolAction, DEFAULT_FALLBACK};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn build_agent(orders: Arc<dyn OrderLookup>) -> (Agent, Arc<MemorySink>, MetricsRegistry) {
    let sink = Arc::new(MemorySink::new());
    let metrics = MetricsRegistry::live("observable-agent").unwrap();
    let agent = Agent::new(
        AgentConfig::default(),
        StructuredLogger::new(sink.clone()),
        metrics.clone(),
    );
    agent.initialize(orders).unwrap();
    sink.clear();
    (agent, sink, metrics)
}

fn fast_orders() -> Arc<dyn OrderLookup> {
    Arc::new(SimulatedOrderLookup::new(Duration::from_millis(10)))
}

#[tokio::test]
async fn test_order_status_lookup_succeeds() {
    let (agent, sink, metrics) = build_agent(fast_orders());

    let response = agent
        .dispatch(
            "get_order_status",
            json!({"order_id": "A1"}),
            CallContext::with_call_id("call-a"),
        )
        .await;

    assert!(response.response.contains("A1"));
    assert!(response.response.contains("shipped"));

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["level"], "INFO");
    assert_eq!(record["function_name"], "get_order_status");
    assert_eq!(record["call_id"], "call-a");
    assert!(record["duration_ms"].as_f64().unwrap() >= 10.0);
    assert_eq!(
        metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "success"]),
        1.0
    );
}

#[tokio::test]
async fn test_ticket_defaults_to_medium_priority() {
    let (agent, sink, metrics) = build_agent(fast_orders());

    let response = agent
        .dispatch(
            "create_ticket",
            json!({"issue": "broken widget"}),
            CallContext::with_call_id("call-b"),
        )
        .await;

    let ticket_pattern = Regex::new(r"^Created ticket (TKT-\d{14})\.$").unwrap();
    let captures = ticket_pattern.captures(&response.response).unwrap();
    let ticket_id = captures[1].to_string();

    match &response.action[0] {
        ToolAction::SetGlobalData(data) => {
            assert_eq!(data["ticket_id"], json!(ticket_id));
            assert_eq!(data["ticket_priority"], "medium");
        }
        other => panic!("unexpected action {other:?}"),
    }

    assert_eq!(metrics.counter_value(Metric::TicketsTotal, &["medium"]), 1.0);

    let created = sink.records_with_message("Ticket created");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["ticket_id"], json!(ticket_id));
    assert_eq!(created[0]["priority"], "medium");
    assert_eq!(sink.records_with_message("Function create_ticket completed").len(), 1);

    let messages: Vec<_> = sink
        .records()
        .iter()
        .map(|r| r["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(messages, vec!["Function create_ticket completed", "Ticket created"]);
}

#[tokio::test]
async fn test_transfer_to_billing() {
    let (agent, sink, metrics) = build_agent(fast_orders());

    let response = agent
        .dispatch(
            "transfer_specialist",
            json!({"department": "billing"}),
            CallContext::with_call_id("call-c"),
        )
        .await;

    assert_eq!(response.response, "Transferring to billing.");
    assert!(response.post_process);
    assert_eq!(response.transfer_target(), Some("/agents/billing"));
    assert!(response.action.contains(&ToolAction::Transfer {
        dest: "/agents/billing".to_string(),
        farewell: "Goodbye!".to_string(),
        final_transfer: true,
    }));
    assert_eq!(metrics.counter_value(Metric::TransfersTotal, &["billing"]), 1.0);
    assert_eq!(sink.records_with_message("Transfer initiated")[0]["department"], "billing");
}

#[tokio::test]
async fn test_order_service_failure_returns_fallback() {
    let (agent, sink, metrics) = build_agent(Arc::new(FailingOrderLookup));

    let response = agent
        .dispatch(
            "get_order_status",
            json!({"order_id": "A1"}),
            CallContext::with_call_id("call-d"),
        )
        .await;

    assert_eq!(response.response, ORDER_STATUS_FALLBACK);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["level"], "ERROR");
    assert_eq!(records[0]["error_type"], "execution_failed");
    assert_eq!(records[0]["call_id"], "call-d");
    assert_eq!(
        metrics.counter_value(Metric::ErrorsTotal, &["get_order_status", "execution_failed"]),
        1.0
    );
    assert_eq!(
        metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "error"]),
        1.0
    );
}

#[tokio::test]
async fn test_panicking_lookup_is_contained() {
    let (agent, sink, metrics) = build_agent(Arc::new(PanickingOrderLookup));

    let response = agent
        .dispatch("get_order_status", json!({"order_id": "A1"}), CallContext::default())
        .await;

    assert_eq!(response.response, ORDER_STATUS_FALLBACK);
    let records = sink.records();
    assert_eq!(records[0]["error_type"], "panic");
    assert_eq!(records[0]["call_id"], "unknown");
    assert_eq!(
        metrics.counter_value(Metric::ErrorsTotal, &["get_order_status", "panic"]),
        1.0
    );
}

#[tokio::test]
async fn test_invalid_arguments_are_a_handler_fault() {
    let (agent, sink, metrics) = build_agent(fast_orders());

    let response = agent
        .dispatch(
            "transfer_specialist",
            json!({"department": "legal"}),
            CallContext::with_call_id("call-x"),
        )
        .await;

    assert_eq!(response.response, DEFAULT_FALLBACK);
    assert_eq!(sink.records()[0]["error_type"], "invalid_arguments");
    assert_eq!(
        metrics.counter_value(
            Metric::ErrorsTotal,
            &["transfer_specialist", "invalid_arguments"]
        ),
        1.0
    );
    assert_eq!(metrics.counter_value(Metric::TransfersTotal, &["legal"]), 0.0);
}

#[tokio::test]
async fn test_system_status() {
    let (agent, sink, _) = build_agent(fast_orders());

    let response = agent
        .dispatch("system_status", json!({}), CallContext::default())
        .await;

    assert_eq!(response.response, "All systems operational.");
    assert_eq!(sink.records()[0]["function_name"], "system_status");
}

#[tokio::test]
async fn test_metrics_disabled_tools_still_work() {
    let sink = Arc::new(MemorySink::new());
    let metrics = MetricsRegistry::null("observable-agent");
    let agent = Agent::new(
        AgentConfig::default(),
        StructuredLogger::new(sink.clone()),
        metrics.clone(),
    );
    agent.initialize(fast_orders()).unwrap();

    let response = agent
        .dispatch("create_ticket", json!({"issue": "x", "priority": "low"}), CallContext::default())
        .await;

    assert!(response.response.starts_with("Created ticket TKT-"));
    assert_eq!(metrics.encode_text().unwrap(), "");
    assert_eq!(sink.records_with_message("Ticket created").len(), 1);
}

#[tokio::test]
async fn test_abandoned_dispatch_is_still_recorded() {
    let (agent, sink, metrics) =
        build_agent(Arc::new(SimulatedOrderLookup::new(Duration::from_millis(100))));

    let dispatch = agent.dispatch(
        "get_order_status",
        json!({"order_id": "A9"}),
        CallContext::with_call_id("call-gone"),
    );
    assert!(tokio::time::timeout(Duration::from_millis(20), dispatch)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;

    let completed = sink.records_with_message("Function get_order_status completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["call_id"], "call-gone");
    assert_eq!(
        metrics.counter_value(Metric::FunctionCallsTotal, &["get_order_status", "success"]),
        1.0
    );
}
