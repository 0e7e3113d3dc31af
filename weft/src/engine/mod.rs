//! Flow engine: the node-at-a-time state machine.
//!
//! `run(session, user_content) → stream of events` produces events until the
//! session completes (terminal event with `current_node == "END"`) or parks
//! (pause event, then the stream ends). Calling `run` again with fresh user
//! content on a parked session resumes exactly once from the recorded
//! cursor; resumption is a pure function of persisted state plus the new
//! content.

mod approval;
mod intent;
mod llm_node;
mod options;
mod parallel;
mod react;
mod recovery;
mod sink;
mod template;
mod tool_node;
mod update_node;

pub use intent::{IntentScanner, ToolIntent};
pub use recovery::{analyze, heuristic, FailureReport, RecoveryVerdict};

use std::sync::Arc;

use serde_json::{json, Value};
use stream_event::{Content, Event};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::FlowError;
use crate::manifest::{Manifest, NodeDef, NodeKind, RetryStrategy, END};
use crate::predicate;
use crate::provider::Provider;
use crate::session::Session;
use crate::state::{keys, SessionState};
use crate::tools::ToolRegistry;

use approval::ResumeDecision;
use sink::EventSink;

/// How a node execution left the flow.
pub(crate) enum NodeOutcome {
    /// Resolve the transition and continue.
    Advance,
    /// The session parked (user input or tool approval); the stream ends.
    Park,
}

/// Everything one run needs, cheap to clone for parallel siblings.
#[derive(Clone)]
pub(crate) struct ExecCtx {
    pub manifest: Arc<Manifest>,
    pub registry: Arc<ToolRegistry>,
    pub provider: Arc<dyn Provider>,
    pub state: SessionState,
    pub sink: EventSink,
    pub cancel: CancellationToken,
}

/// The engine: immutable manifest + tool registry + provider, shared across
/// sessions. Sessions are fully independent; within one session the engine
/// is cooperative single-writer.
pub struct FlowEngine {
    manifest: Arc<Manifest>,
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn Provider>,
}

impl FlowEngine {
    pub fn new(manifest: Manifest, provider: Arc<dyn Provider>, registry: ToolRegistry) -> Self {
        Self {
            manifest: Arc::new(manifest),
            registry: Arc::new(registry),
            provider,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Starts or resumes a session. See the module docs for the contract.
    pub fn run(
        &self,
        session: Arc<Session>,
        user_content: Option<Content>,
    ) -> ReceiverStream<Event> {
        self.run_with_cancel(session, user_content, CancellationToken::new())
    }

    /// Like [`FlowEngine::run`] with caller-controlled cancellation: on
    /// cancel, in-flight provider reads are abandoned and a final error
    /// event is emitted.
    pub fn run_with_cancel(
        &self,
        session: Arc<Session>,
        user_content: Option<Content>,
        cancel: CancellationToken,
    ) -> ReceiverStream<Event> {
        let (tx, rx) = mpsc::channel(128);
        let state = session.state().clone();
        let ctx = ExecCtx {
            manifest: self.manifest.clone(),
            registry: self.registry.clone(),
            provider: self.provider.clone(),
            state: state.clone(),
            sink: EventSink::new(tx, state, session),
            cancel,
        };
        tokio::spawn(async move {
            if let Err(err) = run_loop(&ctx, user_content).await {
                let message = err.to_string();
                if !matches!(err, FlowError::RetriesExhausted { .. }) {
                    let _ = ctx.state.set(
                        keys::FAILURE_INFO,
                        json!({
                            "title": "Flow run failed",
                            "reason": message,
                            "suggestion": "",
                            "error": message,
                            "should_retry": false,
                        }),
                    );
                }
                error!(error = %message, "flow run failed");
                ctx.sink.emit(Event::default().with_error(message)).await;
            }
        });
        ReceiverStream::new(rx)
    }
}

async fn run_loop(ctx: &ExecCtx, mut user_content: Option<Content>) -> Result<(), FlowError> {
    let state = &ctx.state;

    // Fresh session: seed every declared output key so template rendering
    // never hits an undefined key, then point the cursor at the first node.
    if state.get(keys::CURRENT_NODE).is_none() {
        for key in ctx.manifest.declared_state_keys() {
            if !state.contains(&key) {
                put(state, key, json!(""))?;
            }
        }
        let first = ctx
            .manifest
            .first_node()
            .ok_or_else(|| FlowError::Manifest("manifest has no START transition".into()))?
            .to_string();
        info!(first = %first, "flow starting");
        put(state, keys::CURRENT_NODE.to_string(), json!(first))?;
    }

    // A staged approval intercepts the user content before any node runs.
    if state.is_true(keys::AWAITING_APPROVAL) {
        match approval::resume(state, user_content.as_ref())? {
            ResumeDecision::Granted { instruction } => {
                user_content = Some(instruction);
            }
            ResumeDecision::Denied { tool } => {
                ctx.sink
                    .emit(Event::text(
                        "model",
                        format!("Tool '{tool}' was not approved; moving on."),
                    ))
                    .await;
                let current = cursor(state)?;
                let next = resolve_next(ctx, &current)?;
                put(state, keys::CURRENT_NODE.to_string(), json!(next))?;
                user_content = None;
            }
            ResumeDecision::StillParked => {
                put(state, keys::AWAITING_APPROVAL.to_string(), json!(true))?;
                ctx.sink.flush().await;
                return Ok(());
            }
        }
    }

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        let current = cursor(state)?;
        if current == END {
            // A denial can move the cursor straight to END; make sure that
            // delta still reaches the stream.
            ctx.sink.set_silent(false);
            ctx.sink.flush().await;
            return Ok(());
        }
        let node = ctx
            .manifest
            .node(&current)
            .ok_or_else(|| FlowError::Manifest(format!("cursor points at unknown node '{current}'")))?
            .clone();

        ctx.sink.set_silent(node.silent);
        debug!(node = %node.name, kind = %node.kind.as_str(), "entering node");

        // Transition event: cursor + node kind, before any content from N.
        put(state, keys::CURRENT_NODE.to_string(), json!(node.name))?;
        put(state, keys::TEMP_NODE_TYPE.to_string(), json!(node.kind.as_str()))?;
        push_visited(state, &node.name)?;
        ctx.sink.flush().await;

        let outcome = match node.kind {
            NodeKind::Input => run_input(ctx, &node, &mut user_content).await?,
            NodeKind::UpdateState => {
                update_node::apply(&node, state)?;
                ctx.sink.flush().await;
                NodeOutcome::Advance
            }
            NodeKind::Output => {
                let text = node
                    .prompt
                    .as_deref()
                    .map(|p| template::render(p, state))
                    .unwrap_or_default();
                ctx.sink
                    .emit(
                        Event::text("model", text)
                            .with_delta(keys::USER_MESSAGE_DISPLAY, json!(true)),
                    )
                    .await;
                NodeOutcome::Advance
            }
            NodeKind::Llm | NodeKind::Tool => {
                if node.parallel.is_some() {
                    parallel::execute(ctx, &node).await?
                } else {
                    execute_with_retries(ctx, &node, &mut user_content).await?
                }
            }
        };

        match outcome {
            NodeOutcome::Park => return Ok(()),
            NodeOutcome::Advance => {
                let next = resolve_next(ctx, &node.name)?;
                if next == END {
                    put(state, keys::CURRENT_NODE.to_string(), json!(END))?;
                    ctx.sink.set_silent(false);
                    ctx.sink.flush().await;
                    info!("flow complete");
                    return Ok(());
                }
                put(state, keys::CURRENT_NODE.to_string(), json!(next))?;
            }
        }
    }
}

/// Per-node retry loop around one executor. `retry_strategy: simple` retries
/// unconditionally; the default asks the recovery analyzer. Retry-eligible
/// failures surface only as `_retry_info` deltas until retries run out.
pub(crate) async fn execute_with_retries(
    ctx: &ExecCtx,
    node: &NodeDef,
    user_content: &mut Option<Content>,
) -> Result<NodeOutcome, FlowError> {
    let mut attempt: u32 = 0;
    let mut prior_errors: Vec<String> = Vec::new();
    loop {
        let result = match node.kind {
            NodeKind::Llm => llm_node::run_once(ctx, node, user_content).await,
            NodeKind::Tool => tool_node::run_once(ctx, node).await,
            other => {
                return Err(FlowError::Manifest(format!(
                    "node kind '{}' has no retrying executor",
                    other.as_str()
                )))
            }
        };
        let err = match result {
            Ok(outcome) => return Ok(outcome),
            Err(FlowError::Cancelled) => return Err(FlowError::Cancelled),
            Err(err) => err,
        };
        let message = err.to_string();
        let report = FailureReport {
            node: &node.name,
            node_kind: node.kind.as_str(),
            attempt,
            max_retries: node.max_retries,
            error_message: &message,
            prior_errors: &prior_errors,
            tool: None,
        };
        let verdict = match node.retry_strategy {
            RetryStrategy::Simple => recovery::unconditional(&report),
            RetryStrategy::Intelligent => analyze(ctx.provider.as_ref(), &report).await,
        };
        if verdict.should_retry && attempt < node.max_retries {
            attempt += 1;
            warn!(node = %node.name, attempt, error = %message, "retrying node");
            put(
                &ctx.state,
                keys::RETRY_INFO.to_string(),
                json!({
                    "attempt": attempt,
                    "max_retries": node.max_retries,
                    "title": verdict.title,
                    "reason": verdict.one_liner,
                }),
            )?;
            ctx.sink.flush().await;
            prior_errors.push(message);
            continue;
        }
        put(
            &ctx.state,
            keys::FAILURE_INFO.to_string(),
            json!({
                "title": verdict.title,
                "reason": verdict.reason,
                "suggestion": verdict.suggestion,
                "error": message,
                "should_retry": false,
                "at": chrono::Utc::now().to_rfc3339(),
            }),
        )?;
        return Err(FlowError::RetriesExhausted {
            node: node.name.clone(),
            attempts: attempt,
            message,
        });
    }
}

async fn run_input(
    ctx: &ExecCtx,
    node: &NodeDef,
    user_content: &mut Option<Content>,
) -> Result<NodeOutcome, FlowError> {
    if let Some(content) = user_content.take() {
        let key = node
            .output_model
            .first_key()
            .ok_or_else(|| FlowError::Manifest(format!("input node '{}' has no output key", node.name)))?;
        put(&ctx.state, key.to_string(), json!(content.joined_text()))?;
        put(&ctx.state, keys::WAITING_FOR_INPUT.to_string(), json!(false))?;
        ctx.state.delete(keys::INPUT_OPTIONS);
        ctx.sink.flush().await;
        Ok(NodeOutcome::Advance)
    } else {
        let expanded = options::expand_options(&node.options, &ctx.state);
        put(&ctx.state, keys::INPUT_OPTIONS.to_string(), json!(expanded))?;
        put(&ctx.state, keys::WAITING_FOR_INPUT.to_string(), json!(true))?;
        let prompt = node
            .prompt
            .as_deref()
            .map(|p| template::render(p, &ctx.state))
            .unwrap_or_default();
        ctx.sink.emit(Event::text("model", prompt)).await;
        Ok(NodeOutcome::Park)
    }
}

/// Resolves the next cursor: explicit `to` wins; else edge predicates run in
/// order against a state snapshot and the first truthy one routes. Predicate
/// failures count as "didn't match". No match is fatal.
fn resolve_next(ctx: &ExecCtx, from: &str) -> Result<String, FlowError> {
    let transition = ctx
        .manifest
        .transition_from(from)
        .ok_or_else(|| FlowError::NoMatchingTransition(from.to_string()))?;
    if let Some(to) = &transition.to {
        return Ok(to.clone());
    }
    let snapshot = ctx.state.iterate();
    for edge in &transition.edges {
        match &edge.condition {
            None => return Ok(edge.to.clone()),
            Some(condition) => match predicate::evaluate(condition, &snapshot) {
                Ok(true) => {
                    debug!(from = %from, to = %edge.to, "conditional routing");
                    return Ok(edge.to.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(from = %from, condition = %condition, error = %e, "predicate failed, treated as no match");
                }
            },
        }
    }
    Err(FlowError::NoMatchingTransition(from.to_string()))
}

fn cursor(state: &SessionState) -> Result<String, FlowError> {
    state
        .get(keys::CURRENT_NODE)
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| FlowError::State("cursor missing from state".into()))
}

fn push_visited(state: &SessionState, name: &str) -> Result<(), FlowError> {
    let mut visited = state
        .get(keys::TEMP_VISITED)
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();
    visited.push(json!(name));
    put(state, keys::TEMP_VISITED.to_string(), Value::Array(visited))
}

fn put(state: &SessionState, key: impl Into<String>, value: Value) -> Result<(), FlowError> {
    state
        .set(key, value)
        .map_err(|e| FlowError::State(e.to_string()))
}
