//! Tool-approval gate: "one approval = one execution".
//!
//! A tool call passes the gate only when the node-scoped grant
//! `approval:<node>:<tool>` is present; the grant is consumed before the
//! invocation. Otherwise the gate stages the pending call in state, emits an
//! approval prompt, and parks the session. Resume is a pure function of
//! persisted state plus the new user content.

use serde_json::{json, Value};
use stream_event::{Content, Event};
use tracing::debug;

use super::sink::EventSink;
use super::template::value_to_display;
use crate::error::FlowError;
use crate::manifest::NodeDef;
use crate::state::{keys, SessionState};

/// Gate outcome for one attempted invocation.
pub(crate) enum GateDecision {
    /// Grant present (or auto-approval): proceed with the call. The grant
    /// was consumed.
    Execute,
    /// No grant: approval prompt emitted, session parked.
    Parked,
}

/// What a resume with user content means for the staged approval.
pub(crate) enum ResumeDecision {
    /// User approved: the grant is set; re-enter the node with the synthetic
    /// instruction so the model re-issues the call.
    Granted { instruction: Content },
    /// User declined: advance to the next node without invoking.
    Denied { tool: String },
    /// No user content arrived; stay parked.
    StillParked,
}

/// Checks the gate for `tool` at `node`, staging an approval pause when no
/// grant exists.
pub(crate) async fn gate(
    node: &NodeDef,
    tool: &str,
    args: &Value,
    state: &SessionState,
    sink: &EventSink,
) -> Result<GateDecision, FlowError> {
    if node.tools_auto_approval {
        return Ok(GateDecision::Execute);
    }
    let grant_key = keys::approval_key(&node.name, tool);
    if state.is_true(&grant_key) {
        // Single-use: consume before invoking.
        state
            .set(grant_key, Value::Bool(false))
            .map_err(|e| FlowError::State(e.to_string()))?;
        return Ok(GateDecision::Execute);
    }

    debug!(node = %node.name, tool, "tool call requires approval, parking");
    set(state, keys::AWAITING_APPROVAL, Value::Bool(true))?;
    set(state, keys::APPROVAL_TOOL, Value::String(tool.to_string()))?;
    set(state, keys::APPROVAL_ARGS, args.clone())?;
    set(state, keys::APPROVAL_OPTIONS, json!(["Yes", "No"]))?;
    sink.emit(Event::text("model", approval_prompt(tool, args)))
        .await;
    Ok(GateDecision::Parked)
}

/// Routes resumed user content through the staged approval.
pub(crate) fn resume(
    state: &SessionState,
    user_content: Option<&Content>,
) -> Result<ResumeDecision, FlowError> {
    let Some(content) = user_content else {
        return Ok(ResumeDecision::StillParked);
    };
    let tool = state
        .get(keys::APPROVAL_TOOL)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();
    let node = state
        .get(keys::CURRENT_NODE)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();

    set(state, keys::AWAITING_APPROVAL, Value::Bool(false))?;
    state.delete(keys::APPROVAL_TOOL);
    state.delete(keys::APPROVAL_ARGS);
    state.delete(keys::APPROVAL_OPTIONS);

    let reply = content.joined_text().trim().to_lowercase();
    if matches!(reply.as_str(), "y" | "yes" | "approve") {
        set(state, &keys::approval_key(&node, &tool), Value::Bool(true))?;
        debug!(node = %node, tool = %tool, "tool approved");
        Ok(ResumeDecision::Granted {
            instruction: Content::text(
                "user",
                format!("The user approved the tool '{tool}'. Proceed with the call."),
            ),
        })
    } else {
        debug!(node = %node, tool = %tool, "tool denied");
        Ok(ResumeDecision::Denied { tool })
    }
}

fn approval_prompt(tool: &str, args: &Value) -> String {
    format!(
        "Tool '{tool}' requests approval.\nArguments: {}\nApprove? [Yes/No]",
        value_to_display(args)
    )
}

fn set(state: &SessionState, key: &str, value: Value) -> Result<(), FlowError> {
    state
        .set(key, value)
        .map_err(|e| FlowError::State(e.to_string()))
}
