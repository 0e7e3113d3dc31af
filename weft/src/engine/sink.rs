//! Event sink: the single path from the engine to the runner's stream.
//!
//! Every emission drains the session state's pending delta and attaches it
//! to the outgoing event (event-specific entries win), so a delta is sent
//! exactly once. Events emitted while a silent node runs carry a
//! `silent: true` delta flag; events from parallel siblings carry their
//! task id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stream_event::Event;
use tokio::sync::mpsc;

use crate::session::Session;
use crate::state::{keys, SessionState};

#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<Event>,
    state: SessionState,
    session: Arc<Session>,
    silent: Arc<AtomicBool>,
    task_id: Option<String>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<Event>, state: SessionState, session: Arc<Session>) -> Self {
        Self {
            tx,
            state,
            session,
            silent: Arc::new(AtomicBool::new(false)),
            task_id: None,
        }
    }

    /// Marks subsequent emissions as coming from a silent node.
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// Child sink for one parallel sibling: same stream, the sibling's
    /// forked state, and a task tag on every event.
    pub fn for_task(&self, task_id: impl Into<String>, state: SessionState) -> Self {
        Self {
            tx: self.tx.clone(),
            state,
            session: self.session.clone(),
            silent: self.silent.clone(),
            task_id: Some(task_id.into()),
        }
    }

    /// Emits one event, attaching the pending state delta. Event-specific
    /// delta entries take precedence over accumulated ones.
    pub async fn emit(&self, mut event: Event) {
        for (key, value) in self.state.take_delta() {
            event.state_delta.entry(key).or_insert(value);
        }
        if self.silent.load(Ordering::SeqCst) {
            event
                .state_delta
                .insert(keys::SILENT.to_string(), serde_json::Value::Bool(true));
        }
        if self.task_id.is_some() && event.task_id.is_none() {
            event.task_id = self.task_id.clone();
        }
        self.session.record_event(event.clone());
        let _ = self.tx.send(event).await;
    }

    /// Emits a delta-only event when changes are pending; no-op otherwise.
    pub async fn flush(&self) {
        let delta = self.state.take_delta();
        if delta.is_empty() {
            return;
        }
        let mut event = Event::delta(delta);
        if self.silent.load(Ordering::SeqCst) {
            event
                .state_delta
                .insert(keys::SILENT.to_string(), serde_json::Value::Bool(true));
        }
        if self.task_id.is_some() {
            event.task_id = self.task_id.clone();
        }
        self.session.record_event(event.clone());
        let _ = self.tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sink() -> (EventSink, mpsc::Receiver<Event>, SessionState) {
        let (tx, rx) = mpsc::channel(32);
        let state = SessionState::new();
        let session = Arc::new(Session::with_state("s", state.clone()));
        (EventSink::new(tx, state.clone(), session), rx, state)
    }

    /// **Scenario**: emit attaches the pending delta once; the next emit
    /// carries nothing stale.
    #[tokio::test]
    async fn emit_attaches_delta_once() {
        let (sink, mut rx, state) = sink();
        state.set("k", json!(1)).unwrap();
        sink.emit(Event::text("model", "hello")).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.state_delta["k"], json!(1));

        sink.emit(Event::text("model", "again")).await;
        let second = rx.recv().await.unwrap();
        assert!(second.state_delta.is_empty(), "delta not re-sent");
    }

    /// **Scenario**: event-specific delta entries win over accumulated ones.
    #[tokio::test]
    async fn event_delta_wins() {
        let (sink, mut rx, state) = sink();
        state.set("k", json!("stale")).unwrap();
        sink.emit(Event::default().with_delta("k", json!("explicit")))
            .await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.state_delta["k"], json!("explicit"));
    }

    /// **Scenario**: silent mode stamps every event; task sinks tag events.
    #[tokio::test]
    async fn silent_and_task_tags() {
        let (sink, mut rx, state) = sink();
        sink.set_silent(true);
        sink.emit(Event::text("model", "quiet")).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.state_delta[keys::SILENT], json!(true));

        sink.set_silent(false);
        let child_state = state.fork();
        child_state.set("child", json!(1)).unwrap();
        let child = sink.for_task("task-0", child_state);
        child.flush().await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id.as_deref(), Some("task-0"));
        assert_eq!(event.state_delta["child"], json!(1));
    }

    /// **Scenario**: flush with no pending changes emits nothing.
    #[tokio::test]
    async fn flush_empty_is_noop() {
        let (sink, mut rx, _state) = sink();
        sink.flush().await;
        assert!(rx.try_recv().is_err());
    }
}
