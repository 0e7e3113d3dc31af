//! Per-stream envelope stamping: session id, node run id, event sequence.
//!
//! [`EnvelopeState`] walks one event stream and stamps every serialized
//! event with the session id, a node run id (`run-<node>-<seq>`, advanced
//! whenever an event's delta moves the cursor), and a monotonically
//! increasing `event_id`. [`Envelope`] is the concrete snapshot of those
//! three fields, used both for stamping and for reply lines that must quote
//! the stream position.

use serde::Serialize;
use serde_json::Value;

/// Concrete envelope values for one stream position. Unlike the event body,
/// none of these are optional: a stamped event always carries all three.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    /// Session ID; constant within a session.
    pub session_id: String,
    /// Node run ID for the current span (one per cursor advance).
    pub node_id: String,
    /// Per-message sequence number; monotonically increasing within a stream.
    pub event_id: u64,
}

impl Envelope {
    /// Writes the envelope fields into a serialized event. Only JSON objects
    /// are stamped; anything else is left alone. Keys the producer already
    /// set win over the envelope.
    pub fn write_into(&self, value: &mut Value) {
        let Some(obj) = value.as_object_mut() else {
            return;
        };
        for (key, field) in [
            ("session_id", Value::String(self.session_id.clone())),
            ("node_id", Value::String(self.node_id.clone())),
            ("event_id", Value::from(self.event_id)),
        ] {
            if !obj.contains_key(key) {
                obj.insert(key.to_string(), field);
            }
        }
    }
}

/// Stamping state for one run's event stream.
pub struct EnvelopeState {
    session_id: String,
    /// Current node run id; `None` until the first cursor move.
    node_run: Option<String>,
    runs_started: u64,
    next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            node_run: None,
            runs_started: 0,
            next_event_id: 1,
        }
    }

    /// Envelope for the next event without consuming a sequence number.
    /// Used to build reply lines that reference the stream position.
    pub fn peek(&self) -> Envelope {
        Envelope {
            session_id: self.session_id.clone(),
            node_id: self
                .node_run
                .clone()
                .unwrap_or_else(|| "run-0".to_string()),
            event_id: self.next_event_id,
        }
    }

    /// Stamps one serialized event and advances the stream position. When
    /// the event's `state_delta.current_node` moves the cursor, a fresh node
    /// run id is opened first, so the transition event already carries it.
    pub fn stamp(&mut self, value: &mut Value) {
        if let Some(node) = cursor_move(value) {
            self.node_run = Some(format!("run-{node}-{}", self.runs_started));
            self.runs_started += 1;
        }
        let envelope = self.peek();
        self.next_event_id += 1;
        envelope.write_into(value);
    }
}

/// The new cursor value when this event's delta moves it.
fn cursor_move(value: &Value) -> Option<&str> {
    value
        .get("state_delta")?
        .get("current_node")?
        .as_str()
}
