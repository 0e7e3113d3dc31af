//! Event types: the unit emitted by the engine to the runner.
//!
//! An [`Event`] carries optional [`Content`] (a role plus a sequence of
//! [`Part`]s) and a `state_delta` map of keys changed since the previous
//! emission. A part is text, a function call, or a function response.
//! Each event is emitted once; deltas are never re-sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One part of an event's content: text, a tool invocation produced by the
/// model, or the result handed back to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    /// Plain text (streamed model output, prompts, status lines).
    Text { text: String },
    /// A function/tool call intent: id correlates with the matching response.
    FunctionCall {
        id: String,
        name: String,
        args: Value,
    },
    /// Result of a function/tool call, keyed by the call id.
    FunctionResponse { id: String, response: Value },
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Role + ordered parts. Roles follow the provider convention
/// (`user`, `model`, `system`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    /// Content with a single text part.
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenation of all text parts (function parts skipped).
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A record emitted by the engine: optional content plus the per-event state
/// delta accumulated since the previous emission.
///
/// **Interaction**: built by the flow engine, consumed by runners and UIs.
/// Ordering matters: the transition event for node N precedes any content
/// event produced by N.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state_delta: Map<String, Value>,
    /// Terminal error message, set only on failure events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque sibling task id; set on events emitted from inside a parallel
    /// scatter so UIs can demultiplex interleaved child streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Event {
    /// Event with content only.
    pub fn content(content: Content) -> Self {
        Self {
            content: Some(content),
            ..Self::default()
        }
    }

    /// Event with a state delta only.
    pub fn delta(state_delta: Map<String, Value>) -> Self {
        Self {
            state_delta,
            ..Self::default()
        }
    }

    /// Event with a single text part for `role` and no delta.
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self::content(Content::text(role, text))
    }

    /// Adds or replaces one delta entry (builder).
    pub fn with_delta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state_delta.insert(key.into(), value);
        self
    }

    /// Marks the event as a terminal error (builder).
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Tags the event with a sibling task id (builder).
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// True when the delta marks the session as parked: the runner should
    /// treat the turn as complete and wait for user content.
    pub fn is_park(&self) -> bool {
        let truthy = |k: &str| {
            self.state_delta
                .get(k)
                .map(|v| v.as_bool().unwrap_or(false))
                .unwrap_or(false)
        };
        truthy("waiting_for_input") || truthy("awaiting_approval")
    }

    /// True when the delta moves the cursor to the terminal `END` node.
    pub fn is_end(&self) -> bool {
        self.state_delta
            .get("current_node")
            .and_then(Value::as_str)
            .map(|n| n == "END")
            .unwrap_or(false)
    }

    /// Serializes the event to a JSON object (no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
