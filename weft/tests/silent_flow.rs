//! Integration: silent nodes update state without user-visible rendering.


use std::sync::Arc;

use serde_json::json;
use tokio_stream::StreamExt;
use weft::state::keys;
use weft::{Event, FlowEngine, InMemorySessionService, Manifest, MockProvider, SessionService, ToolRegistry};

const FLOW: &str = r#"
nodes:
  - name: prep
    type: update_state
    silent: true
    updates:
      - key: greeting
        value: "hi"
      - key: visits
        action: increment
  - name: announce
    type: output
    prompt: "{greeting} there"
flow:
  - from: START
    to: prep
  - from: prep
    to: announce
  - from: announce
    to: END
"#;

#[tokio::test]
async fn silent_node_events_are_flagged_but_state_still_updates() {
    let engine = FlowEngine::new(
        Manifest::from_yaml(FLOW).expect("valid manifest"),
        Arc::new(MockProvider::text("unused")),
        ToolRegistry::new(),
    );
    let sessions = InMemorySessionService::new();
    let session = sessions.create(None).await.unwrap();

    let events: Vec<Event> = engine.run(session.clone(), None).collect().await;

    // State updates from the silent node landed.
    assert_eq!(session.state().get("greeting"), Some(json!("hi")));
    assert_eq!(session.state().get("visits"), Some(json!(1)));

    // Every event emitted while prep ran carries the silent flag; the
    // announce node's events do not.
    for event in &events {
        let about_prep = event.state_delta.get(keys::CURRENT_NODE) == Some(&json!("prep"))
            || event.state_delta.contains_key("greeting");
        let about_announce = event.state_delta.contains_key(keys::USER_MESSAGE_DISPLAY);
        if about_prep {
            assert_eq!(
                event.state_delta.get(keys::SILENT),
                Some(&json!(true)),
                "silent node event missing flag: {event:?}"
            );
        }
        if about_announce {
            assert!(
                !event.state_delta.contains_key(keys::SILENT),
                "announce is not silent: {event:?}"
            );
        }
    }

    // The output node surfaced its rendered text once.
    let displays: Vec<_> = events
        .iter()
        .filter(|e| e.state_delta.contains_key(keys::USER_MESSAGE_DISPLAY))
        .collect();
    assert_eq!(displays.len(), 1);
    assert_eq!(
        displays[0].content.as_ref().unwrap().joined_text(),
        "hi there"
    );

    assert!(events.last().unwrap().is_end());
    assert!(
        !events.last().unwrap().state_delta.contains_key(keys::SILENT),
        "terminal event is not silent"
    );
}
