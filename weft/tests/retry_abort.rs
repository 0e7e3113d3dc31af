//! Integration: retry loop: `_retry_info` deltas until retries run out,
//! then `_failure_info` plus an error event.


use std::sync::Arc;

use serde_json::json;
use tokio_stream::StreamExt;
use weft::state::keys;
use weft::{
    Event, FlowEngine, InMemorySessionService, Manifest, MockProvider, ScriptedTool,
    SessionService, ToolRegistry,
};

const FLAKY_FLOW: &str = r#"
nodes:
  - name: probe
    type: tool
    tools_selection:
      - flaky
    tools_auto_approval: true
    max_retries: 2
    retry_strategy: simple
    output_model:
      probe_result: str
flow:
  - from: START
    to: probe
  - from: probe
    to: END
"#;

async fn run_flow(flow: &str, provider: MockProvider, tool: Arc<ScriptedTool>) -> (Vec<Event>, Arc<weft::Session>) {
    let mut registry = ToolRegistry::new();
    registry.register(tool).unwrap();
    let engine = FlowEngine::new(
        Manifest::from_yaml(flow).expect("valid manifest"),
        Arc::new(provider),
        registry,
    );
    let sessions = InMemorySessionService::new();
    let session = sessions.create(None).await.unwrap();
    let events = engine.run(session.clone(), None).collect().await;
    (events, session)
}

/// Rate-limited tool with max_retries=2: two retry deltas, then abort.
#[tokio::test]
async fn retries_then_aborts_with_failure_info() {
    let tool = Arc::new(ScriptedTool::failing("flaky", "rate limit"));
    let (events, session) = run_flow(FLAKY_FLOW, MockProvider::text("unused"), tool.clone()).await;

    assert_eq!(tool.call_count(), 3, "initial attempt plus two retries");

    let retry_attempts: Vec<i64> = events
        .iter()
        .filter_map(|e| e.state_delta.get(keys::RETRY_INFO))
        .filter_map(|info| info.get("attempt").and_then(|a| a.as_i64()))
        .collect();
    assert_eq!(retry_attempts, vec![1, 2]);

    let failure = events
        .iter()
        .find_map(|e| e.state_delta.get(keys::FAILURE_INFO))
        .expect("failure info surfaced");
    assert_eq!(failure["should_retry"], json!(false));
    assert!(failure["error"].as_str().unwrap().contains("rate limit"));

    let last = events.last().unwrap();
    assert!(last.error.as_deref().unwrap_or("").contains("rate limit"));
    assert_ne!(
        session.state().get(keys::CURRENT_NODE),
        Some(json!("END")),
        "flow did not complete"
    );
}

/// With the intelligent strategy, a terminal classification aborts without
/// burning the remaining attempts. (The analyzer's own model call returns
/// prose here, so the keyword heuristic decides.)
#[tokio::test]
async fn terminal_error_skips_remaining_retries() {
    let flow = FLAKY_FLOW.replace("retry_strategy: simple", "retry_strategy: intelligent");
    let tool = Arc::new(ScriptedTool::failing("flaky", "401 authentication failed"));
    let (events, _session) =
        run_flow(&flow, MockProvider::text("not a json verdict"), tool.clone()).await;

    assert_eq!(tool.call_count(), 1, "no retry after a terminal verdict");
    assert!(events
        .iter()
        .all(|e| !e.state_delta.contains_key(keys::RETRY_INFO)));
    assert!(events
        .iter()
        .any(|e| e.state_delta.contains_key(keys::FAILURE_INFO)));
}

/// A transient failure that clears up mid-way completes the flow; the retry
/// deltas are the only trace.
#[tokio::test]
async fn transient_failure_recovers() {
    let tool = Arc::new(ScriptedTool::with_script(
        "flaky",
        vec![
            Err("connection reset".into()),
            Ok(json!({"status": "ok"})),
        ],
    ));
    let (events, session) = run_flow(FLAKY_FLOW, MockProvider::text("unused"), tool.clone()).await;

    assert_eq!(tool.call_count(), 2);
    assert!(events
        .iter()
        .any(|e| e.state_delta.contains_key(keys::RETRY_INFO)));
    assert!(events
        .iter()
        .all(|e| !e.state_delta.contains_key(keys::FAILURE_INFO)));
    assert!(events.last().unwrap().is_end());
    assert_eq!(
        session.state().get("probe_result"),
        Some(json!({"status": "ok"})),
        "tool result routed into the declared output key"
    );
}
