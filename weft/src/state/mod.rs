//! Session state: a thread-safe key→value map with change-delta accounting.
//!
//! Every `set`/`delete` lands in a pending delta; [`SessionState::take_delta`]
//! flushes it so the engine can attach it to the next outgoing event. A delta
//! is never re-sent. Writes may be rejected by an injected guard (standing in
//! for a runner's persistence layer); the engine treats rejection as fatal to
//! the current step.

pub mod keys;

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::{Map, Value};
use thiserror::Error;

/// State write rejected by the persistence guard.
#[derive(Debug, Error)]
#[error("state write rejected for '{key}': {reason}")]
pub struct StateError {
    pub key: String,
    pub reason: String,
}

type WriteGuard = dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync;

/// Mutable key→value store for one session.
///
/// **Interaction**: mutated by every node executor; snapshotted for predicate
/// evaluation and template rendering; deltas drained by the event sink.
#[derive(Clone, Default)]
pub struct SessionState {
    values: Arc<DashMap<String, Value>>,
    delta: Arc<Mutex<Map<String, Value>>>,
    guard: Option<Arc<WriteGuard>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a write guard that can reject sets (tests and persistence
    /// wrappers use this).
    pub fn with_guard(
        mut self,
        guard: impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.guard = Some(Arc::new(guard));
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// True when the key holds boolean `true`.
    pub fn is_true(&self, key: &str) -> bool {
        self.get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Sets a key and records it in the pending delta.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<(), StateError> {
        let key = key.into();
        if let Some(guard) = &self.guard {
            guard(&key, &value).map_err(|reason| StateError {
                key: key.clone(),
                reason,
            })?;
        }
        self.values.insert(key.clone(), value.clone());
        self.delta
            .lock()
            .expect("delta mutex poisoned")
            .insert(key, value);
        Ok(())
    }

    /// Removes a key; the deletion is recorded as a `null` delta entry.
    pub fn delete(&self, key: &str) {
        self.values.remove(key);
        self.delta
            .lock()
            .expect("delta mutex poisoned")
            .insert(key.to_string(), Value::Null);
    }

    /// Snapshot of all pairs, for predicate evaluation and templates.
    pub fn iterate(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drains the pending delta. Empty map when nothing changed since the
    /// last flush.
    pub fn take_delta(&self) -> Map<String, Value> {
        std::mem::take(&mut *self.delta.lock().expect("delta mutex poisoned"))
    }

    /// Copy of the current values without delta bookkeeping; used to build
    /// per-sibling state for parallel scatter.
    pub fn fork(&self) -> SessionState {
        let forked = SessionState::new();
        for entry in self.values.iter() {
            forked.values.insert(entry.key().clone(), entry.value().clone());
        }
        forked
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("len", &self.values.len())
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: set records the change in the delta; take_delta flushes
    /// it exactly once.
    #[test]
    fn delta_flushed_once() {
        let state = SessionState::new();
        state.set("a", json!(1)).unwrap();
        state.set("b", json!("x")).unwrap();
        let delta = state.take_delta();
        assert_eq!(delta.len(), 2);
        assert_eq!(delta["a"], json!(1));
        assert!(state.take_delta().is_empty(), "delta is never re-sent");
        assert_eq!(state.get("a"), Some(json!(1)), "value persists");
    }

    /// **Scenario**: delete removes the value and records a null delta entry.
    #[test]
    fn delete_records_null() {
        let state = SessionState::new();
        state.set("k", json!("v")).unwrap();
        state.take_delta();
        state.delete("k");
        assert!(state.get("k").is_none());
        assert_eq!(state.take_delta()["k"], Value::Null);
    }

    /// **Scenario**: a rejecting guard fails the write and leaves no trace.
    #[test]
    fn guard_rejects_write() {
        let state = SessionState::new().with_guard(|key, _| {
            if key == "forbidden" {
                Err("persistence refused".into())
            } else {
                Ok(())
            }
        });
        assert!(state.set("ok", json!(1)).is_ok());
        let err = state.set("forbidden", json!(2)).unwrap_err();
        assert!(err.to_string().contains("persistence refused"));
        assert!(state.get("forbidden").is_none());
        assert!(!state.take_delta().contains_key("forbidden"));
    }

    /// **Scenario**: fork copies values but not pending delta; writes to the
    /// fork do not touch the parent.
    #[test]
    fn fork_is_isolated() {
        let state = SessionState::new();
        state.set("shared", json!("v")).unwrap();
        let fork = state.fork();
        assert_eq!(fork.get("shared"), Some(json!("v")));
        assert!(fork.take_delta().is_empty());
        fork.set("child_only", json!(1)).unwrap();
        assert!(state.get("child_only").is_none());
    }

    /// **Scenario**: is_true only for boolean true.
    #[test]
    fn is_true_strictness() {
        let state = SessionState::new();
        state.set("t", json!(true)).unwrap();
        state.set("s", json!("true")).unwrap();
        assert!(state.is_true("t"));
        assert!(!state.is_true("s"));
        assert!(!state.is_true("missing"));
    }
}
