//! # Weft
//!
//! A declarative **agent-flow runtime**: flows are authored as YAML
//! manifests enumerating nodes (input, llm, tool, update_state, output) and
//! transitions; the engine interprets the manifest as a state machine whose
//! cursor advances node by node, persists a mutable session state between
//! steps, streams intermediate events to the caller, and pauses for user
//! input or explicit human approval of side-effecting tool calls.
//!
//! ## Design principles
//!
//! - **Flows are data**: behavior lives in the manifest; the engine is a
//!   generic interpreter. Transition conditions are sandboxed Python-syntax
//!   expressions over state, never host code.
//! - **One event path**: everything the caller sees (streamed model text,
//!   prompts, approval requests, state deltas) arrives as [`Event`]s on the
//!   stream returned by [`FlowEngine::run`].
//! - **Pause is state**: a parked session is fully described by its state
//!   map; resuming needs no in-memory closure, only `run(session, content)`.
//! - **One approval = one execution**: tool grants are node-scoped and
//!   consumed by the very next invocation.
//!
//! ## Main modules
//!
//! - [`manifest`]: [`Manifest`], [`NodeDef`], [`Transition`]: parse and
//!   validate flows.
//! - [`engine`]: [`FlowEngine`]: run/resume sessions, retries, parallel
//!   scatter, the ReAct fallback planner, and the approval gate.
//! - [`predicate`]: sandboxed condition evaluation ([`Predicate`]).
//! - [`state`]: [`SessionState`] with delta accounting; reserved protocol
//!   keys in [`state::keys`].
//! - [`session`]: [`SessionService`], [`InMemorySessionService`].
//! - [`tools`]: [`Tool`], [`Toolset`], [`ToolRegistry`], [`ScriptedTool`].
//! - [`provider`]: [`Provider`] seam, [`MockProvider`] for tests.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//! use weft::{FlowEngine, InMemorySessionService, Manifest, MockProvider, SessionService, ToolRegistry};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = Manifest::from_yaml(
//!     "nodes:\n  - name: greet\n    type: llm\n    prompt: say hello\nflow:\n  - from: START\n    to: greet\n  - from: greet\n    to: END\n",
//! )?;
//! let engine = FlowEngine::new(
//!     manifest,
//!     Arc::new(MockProvider::text("hello!")),
//!     ToolRegistry::new(),
//! );
//! let sessions = InMemorySessionService::new();
//! let session = sessions.create(None).await?;
//! let mut events = engine.run(session, None);
//! while let Some(event) = events.next().await {
//!     if let Some(content) = &event.content {
//!         println!("{}", content.joined_text());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod manifest;
pub mod predicate;
pub mod provider;
pub mod session;
pub mod state;
pub mod tools;

pub use engine::{FailureReport, FlowEngine, IntentScanner, RecoveryVerdict, ToolIntent};
pub use error::FlowError;
pub use manifest::{
    Edge, Manifest, ManifestError, NodeDef, NodeKind, ParallelSpec, RetryStrategy, Transition,
    END, START,
};
pub use predicate::{Predicate, PredicateError};
pub use provider::{
    Chunk, FunctionCall, FunctionDecl, GenerateConfig, LlmRequest, LlmResponse, MockProvider,
    MockStep, Provider, ProviderError,
};
pub use session::{InMemorySessionService, Session, SessionError, SessionService};
pub use state::{SessionState, StateError};
pub use stream_event::{Content, Event, Part};
pub use tools::{ScriptedTool, Tool, ToolError, ToolRegistry, ToolSpec, Toolset};
