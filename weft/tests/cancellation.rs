//! Integration: caller-driven cancellation ends the run with an error event.


use std::sync::Arc;

use serde_json::json;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use weft::state::keys;
use weft::{Event, FlowEngine, InMemorySessionService, Manifest, MockProvider, SessionService, ToolRegistry};

const FLOW: &str = r#"
nodes:
  - name: step
    type: llm
    prompt: "do the thing"
flow:
  - from: START
    to: step
  - from: step
    to: END
"#;

#[tokio::test]
async fn pre_cancelled_run_emits_terminal_error() {
    let engine = FlowEngine::new(
        Manifest::from_yaml(FLOW).expect("valid manifest"),
        Arc::new(MockProvider::text("never seen")),
        ToolRegistry::new(),
    );
    let sessions = InMemorySessionService::new();
    let session = sessions.create(None).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let events: Vec<Event> = engine
        .run_with_cancel(session.clone(), None, cancel)
        .collect()
        .await;

    let last = events.last().expect("a final error event");
    assert_eq!(last.error.as_deref(), Some("run cancelled"));
    assert!(last.state_delta.contains_key(keys::FAILURE_INFO));
    assert_ne!(session.state().get(keys::CURRENT_NODE), Some(json!("END")));
}

#[tokio::test]
async fn uncancelled_token_runs_to_end() {
    let engine = FlowEngine::new(
        Manifest::from_yaml(FLOW).expect("valid manifest"),
        Arc::new(MockProvider::text("done")),
        ToolRegistry::new(),
    );
    let sessions = InMemorySessionService::new();
    let session = sessions.create(None).await.unwrap();

    let events: Vec<Event> = engine
        .run_with_cancel(session.clone(), None, CancellationToken::new())
        .collect()
        .await;
    assert!(events.last().unwrap().is_end());
}
