//! Integration: parallel scatter: fan-out, task tags, merge policy.


use std::sync::Arc;

use serde_json::json;
use tokio_stream::StreamExt;
use weft::state::keys;
use weft::{
    Event, FlowEngine, InMemorySessionService, Manifest, MockProvider, ScriptedTool,
    SessionService, ToolRegistry,
};

const APPEND_FLOW: &str = r#"
nodes:
  - name: seed
    type: update_state
    updates:
      - key: items
        value: [alpha, beta, gamma]
  - name: expand
    type: llm
    prompt: "summarize {item}"
    output_model:
      summary: str
    output_action: append
    parallel:
      for_each: items
      as: item
      index_as: idx
      max_concurrency: 2
flow:
  - from: START
    to: seed
  - from: seed
    to: expand
  - from: expand
    to: END
"#;

async fn run(flow: &str, provider: MockProvider, tool: Option<Arc<ScriptedTool>>) -> (Vec<Event>, Arc<weft::Session>) {
    let mut registry = ToolRegistry::new();
    if let Some(tool) = tool {
        registry.register(tool).unwrap();
    }
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

/// Three siblings under concurrency 2; `output_action: append` gathers one
/// summary per item, and sibling events carry task ids.
#[tokio::test]
async fn scatter_appends_sibling_outputs() {
    // Every sibling's turn and projection fall back to the same raw text.
    let (events, session) = run(APPEND_FLOW, MockProvider::text("a summary"), None).await;

    let summary = session
        .state()
        .get("summary")
        .and_then(|v| v.as_array().cloned())
        .expect("summary aggregated into a list");
    assert_eq!(summary.len(), 3, "one entry per item");
    assert!(summary.iter().all(|v| v == &json!("a summary")));

    let tagged: Vec<&str> = events
        .iter()
        .filter_map(|e| e.task_id.as_deref())
        .collect();
    assert!(!tagged.is_empty(), "sibling events are task-tagged");
    assert!(tagged.iter().all(|t| t.starts_with("task-")));

    assert!(events.last().unwrap().is_end());
}

const SCALAR_TOOL_FLOW: &str = r#"
nodes:
  - name: seed
    type: update_state
    updates:
      - key: items
        value: [one, two]
  - name: probe
    type: tool
    tools_selection:
      - probe_tool
    tools_auto_approval: true
    args:
      target: "{item}"
    output_model:
      probe_result: str
    retry_strategy: simple
    max_retries: 0
    parallel:
      for_each: items
      as: item
      max_concurrency: 2
flow:
  - from: START
    to: seed
  - from: seed
    to: probe
  - from: probe
    to: END
"#;

/// Without `output_action: append`, distinct sibling writes to a scalar key
/// are rejected instead of silently overwritten.
#[tokio::test]
async fn conflicting_scalar_writes_rejected() {
    let tool = Arc::new(ScriptedTool::with_script(
        "probe_tool",
        vec![Ok(json!({"v": 1})), Ok(json!({"v": 2}))],
    ));
    let (events, session) = run(SCALAR_TOOL_FLOW, MockProvider::text("unused"), Some(tool)).await;

    let last = events.last().unwrap();
    let error = last.error.as_deref().expect("terminal error event");
    assert!(error.contains("conflicting"), "{error}");
    assert_ne!(session.state().get(keys::CURRENT_NODE), Some(json!("END")));
}

/// Identical sibling writes to a scalar key are accepted (no conflict).
#[tokio::test]
async fn identical_scalar_writes_accepted() {
    let tool = Arc::new(ScriptedTool::ok("probe_tool", json!({"v": "same"})));
    let (events, session) = run(SCALAR_TOOL_FLOW, MockProvider::text("unused"), Some(tool)).await;

    assert!(events.last().unwrap().is_end());
    assert_eq!(
        session.state().get("probe_result"),
        Some(json!({"v": "same"}))
    );
}

/// A sibling failing beyond retry fails the scatter; partial outputs are
/// discarded.
#[tokio::test]
async fn sibling_failure_discards_partials() {
    let tool = Arc::new(ScriptedTool::with_script(
        "probe_tool",
        vec![Ok(json!({"v": "good"})), Err("boom".into())],
    ));
    let (events, session) = run(SCALAR_TOOL_FLOW, MockProvider::text("unused"), Some(tool)).await;

    let last = events.last().unwrap();
    assert!(last.error.is_some(), "scatter surfaced the failure");
    assert_eq!(
        session.state().get("probe_result"),
        Some(json!("")),
        "partial sibling output discarded"
    );
}
