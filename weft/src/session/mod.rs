//! Session service: create/get/delete/list sessions and append their events.
//!
//! The engine does not prescribe storage; [`InMemorySessionService`] suffices
//! for normal operation. Any wrapper must guarantee that `create` produces a
//! session whose state map is non-nil; hosts have repeatedly gotten this
//! wrong, so the constructor enforces it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use stream_event::Event;
use thiserror::Error;
use uuid::Uuid;

use crate::state::SessionState;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session storage error: {0}")]
    Storage(String),
}

/// One conversation: id, mutable state, and the events emitted so far.
pub struct Session {
    pub id: String,
    state: SessionState,
    events: Mutex<Vec<Event>>,
}

impl Session {
    /// Builds a session with a guaranteed non-nil state map.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::new(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Builds a session around an existing state (tests, resume wrappers).
    pub fn with_state(id: impl Into<String>, state: SessionState) -> Self {
        Self {
            id: id.into(),
            state,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Events recorded for this session, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events mutex poisoned").clone()
    }

    pub(crate) fn record_event(&self, event: Event) {
        self.events
            .lock()
            .expect("events mutex poisoned")
            .push(event);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

/// Storage seam for sessions. In-memory by default; inject a wrapper to
/// persist elsewhere.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Creates a session. `id: None` assigns a fresh UUID. The returned
    /// session always has a usable state map.
    async fn create(&self, id: Option<String>) -> Result<Arc<Session>, SessionError>;

    async fn get(&self, id: &str) -> Result<Arc<Session>, SessionError>;

    async fn delete(&self, id: &str) -> Result<(), SessionError>;

    async fn list(&self) -> Result<Vec<String>, SessionError>;

    /// Appends one emitted event to the session's history.
    async fn append_event(&self, id: &str, event: Event) -> Result<(), SessionError>;
}

/// Process-local session store backed by a concurrent map.
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: DashMap<String, Arc<Session>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create(&self, id: Option<String>) -> Result<Arc<Session>, SessionError> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = Arc::new(Session::new(id.clone()));
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.sessions.iter().map(|e| e.key().clone()).collect())
    }

    async fn append_event(&self, id: &str, event: Event) -> Result<(), SessionError> {
        let session = self.get(id).await?;
        session.record_event(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: create returns a session with a usable state map, with
    /// or without an explicit id.
    #[tokio::test]
    async fn create_yields_usable_state() {
        let svc = InMemorySessionService::new();
        let s = svc.create(None).await.unwrap();
        assert!(!s.id.is_empty());
        s.state().set("k", json!(1)).unwrap();
        assert_eq!(s.state().get("k"), Some(json!(1)));

        let named = svc.create(Some("fixed".into())).await.unwrap();
        assert_eq!(named.id, "fixed");
    }

    /// **Scenario**: get/delete/list round-trip; get after delete is NotFound.
    #[tokio::test]
    async fn lifecycle_roundtrip() {
        let svc = InMemorySessionService::new();
        svc.create(Some("a".into())).await.unwrap();
        svc.create(Some("b".into())).await.unwrap();
        let mut ids = svc.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        svc.delete("a").await.unwrap();
        assert!(matches!(
            svc.get("a").await,
            Err(SessionError::NotFound(_))
        ));
    }

    /// **Scenario**: append_event accumulates events in order.
    #[tokio::test]
    async fn append_event_accumulates() {
        let svc = InMemorySessionService::new();
        let s = svc.create(Some("s".into())).await.unwrap();
        svc.append_event("s", Event::text("model", "one")).await.unwrap();
        svc.append_event("s", Event::text("model", "two")).await.unwrap();
        let events = s.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content.as_ref().unwrap().joined_text(), "one");
    }
}
