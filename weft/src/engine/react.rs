//! Fallback ReAct planner for providers without native tool calling.
//!
//! When a provider rejects requests that carry tool schemas, the LLM node
//! re-runs here: the model is prompted into a Thought/Action/Action
//! Input/Observation loop, the planner parses `Action:` lines, invokes the
//! tool locally (through the approval gate), appends the observation, and
//! continues until `Final Answer:` appears. A spinner-update event is
//! emitted on each iteration.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use stream_event::{Content, Event};
use tracing::debug;

use super::approval::{self, GateDecision};
use super::recovery::extract_json;
use super::template::value_to_display;
use super::ExecCtx;
use crate::error::FlowError;
use crate::manifest::NodeDef;
use crate::state::keys;
use crate::tools::ToolSpec;

const MAX_ITERATIONS: usize = 8;

static FINAL_ANSWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)Final Answer:\s*(.*)").expect("final answer regex"));
static ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Action:\s*(.+?)\s*$").expect("action regex"));
static ACTION_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Action Input:\s*(.*?)(?:\n\s*(?:Observation|Thought|Action):|\z)")
        .expect("action input regex")
});

/// Planner result: either the final answer text, or the session parked for
/// tool approval (the node re-runs from the top on resume).
pub(crate) enum PlannerOutcome {
    Final(String),
    Parked,
}

pub(crate) async fn run_planner(
    ctx: &ExecCtx,
    node: &NodeDef,
    instruction: &str,
    tools: &[ToolSpec],
) -> Result<PlannerOutcome, FlowError> {
    let mut transcript = vec![Content::text("user", planner_preamble(instruction, tools))];

    for iteration in 1..=MAX_ITERATIONS {
        ctx.state
            .set(keys::TEMP_STATUS, json!(format!("planner iteration {iteration}")))
            .map_err(|e| FlowError::State(e.to_string()))?;
        ctx.sink.flush().await;

        let request = crate::provider::LlmRequest {
            contents: transcript.clone(),
            config: Default::default(),
        };
        let response = ctx.provider.generate(&request).await?;
        let text = response.text;
        ctx.sink.emit(Event::text("model", text.clone())).await;

        if let Some(answer) = FINAL_ANSWER.captures(&text).map(|c| c[1].trim().to_string()) {
            return Ok(PlannerOutcome::Final(answer));
        }

        let Some(action) = ACTION.captures(&text).map(|c| c[1].trim().to_string()) else {
            // No action requested and no final marker: the text is the answer.
            return Ok(PlannerOutcome::Final(text.trim().to_string()));
        };
        let args = parse_action_input(&text);

        match approval::gate(node, &action, &args, &ctx.state, &ctx.sink).await? {
            GateDecision::Parked => return Ok(PlannerOutcome::Parked),
            GateDecision::Execute => {}
        }

        let tool = ctx.registry.lookup(&action).await?;
        let result = tool.invoke(args).await?;
        debug!(node = %node.name, tool = %action, iteration, "planner invoked tool");

        transcript.push(Content::text("model", text));
        transcript.push(Content::text(
            "user",
            format!("Observation: {}", value_to_display(&result)),
        ));
    }

    Err(FlowError::Provider(crate::provider::ProviderError::Stream(
        format!("planner exceeded {MAX_ITERATIONS} iterations"),
    )))
}

/// True when the executor should route this node through the planner.
pub(crate) fn planner_active(ctx: &ExecCtx) -> bool {
    ctx.state.is_true(keys::USE_REACT_FALLBACK)
}

/// Flips the sticky fallback flag for the rest of the session.
pub(crate) fn mark_fallback(ctx: &ExecCtx) -> Result<(), FlowError> {
    ctx.state
        .set(keys::USE_REACT_FALLBACK, json!(true))
        .map_err(|e| FlowError::State(e.to_string()))
}

fn planner_preamble(instruction: &str, tools: &[ToolSpec]) -> String {
    let mut tool_lines = String::new();
    for spec in tools {
        tool_lines.push_str(&format!(
            "- {}: {}\n",
            spec.name,
            spec.description.as_deref().unwrap_or("no description")
        ));
    }
    format!(
        "{instruction}\n\n\
         This model cannot call tools natively. Work step by step using exactly this format:\n\
         Thought: your reasoning\n\
         Action: the tool to use\n\
         Action Input: the tool arguments as JSON\n\
         After each action you will be given:\n\
         Observation: the tool result\n\
         When you have the answer, reply with:\n\
         Final Answer: the answer\n\n\
         Available tools:\n{tool_lines}"
    )
}

fn parse_action_input(text: &str) -> Value {
    let Some(raw) = ACTION_INPUT.captures(text).map(|c| c[1].trim().to_string()) else {
        return json!({});
    };
    if raw.is_empty() {
        return json!({});
    }
    extract_json(&raw)
        .and_then(|j| serde_json::from_str(&j).ok())
        .unwrap_or(Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Action and Action Input lines parse; JSON args decode.
    #[test]
    fn parses_action_lines() {
        let text = "Thought: need weather\nAction: search\nAction Input: {\"q\": \"rain\"}\n";
        assert_eq!(ACTION.captures(text).unwrap()[1].trim(), "search");
        assert_eq!(parse_action_input(text), json!({"q": "rain"}));
    }

    /// **Scenario**: Non-JSON action input survives as a string.
    #[test]
    fn non_json_input_is_string() {
        let text = "Action: search\nAction Input: plain words\n";
        assert_eq!(parse_action_input(text), json!("plain words"));
    }

    /// **Scenario**: Final Answer captures everything after the marker.
    #[test]
    fn final_answer_extraction() {
        let text = "Thought: done\nFinal Answer: 42 is the answer.\n";
        let answer = FINAL_ANSWER.captures(text).unwrap()[1].trim().to_string();
        assert_eq!(answer, "42 is the answer.");
    }

    /// **Scenario**: Action Input stops at a following Observation line.
    #[test]
    fn action_input_bounded_by_observation() {
        let text = "Action: t\nAction Input: {\"a\": 1}\nObservation: old result\n";
        assert_eq!(parse_action_input(text), json!({"a": 1}));
    }
}
