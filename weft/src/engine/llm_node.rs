//! LLM-node executor: render templates, stream the model turn, intercept
//! tool calls, project output into state.
//!
//! Tool intents arrive two ways: native function-call parts from the
//! provider, and XML-tagged intents detected in streamed text. Either form
//! passes the approval gate before execution. When the provider rejects
//! tool schemas outright, the sticky ReAct fallback takes over for the rest
//! of the session.

use serde_json::{json, Value};
use stream_event::{Content, Event, Part};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::approval::{self, GateDecision};
use super::intent::IntentScanner;
use super::react::{self, PlannerOutcome};
use super::recovery::extract_json;
use super::sink::EventSink;
use super::template::{render, value_to_display};
use super::{ExecCtx, NodeOutcome};
use crate::error::FlowError;
use crate::manifest::NodeDef;
use crate::provider::{Chunk, FunctionCall, FunctionDecl, GenerateConfig, LlmRequest};
use crate::state::keys;
use crate::tools::ToolSpec;

/// Upper bound on model↔tool rounds within one node attempt.
const MAX_TOOL_ROUNDS: usize = 8;

/// Appended to the instruction when tools are in play; hardens against
/// models that narrate tool use instead of invoking.
const TOOL_USE_CLAUSE: &str =
    "You have access to tools. When a tool is needed, use it; do not just describe your intent.";

/// One attempt at an LLM node. Returns `Park` when a tool call is staged for
/// approval; errors feed the retry loop.
pub(crate) async fn run_once(
    ctx: &ExecCtx,
    node: &NodeDef,
    user_content: &mut Option<Content>,
) -> Result<NodeOutcome, FlowError> {
    let instruction = build_instruction(ctx, node);
    let tools_enabled = node.tools || !node.tools_selection.is_empty();
    let specs = if tools_enabled {
        selected_specs(ctx, node).await?
    } else {
        Vec::new()
    };

    if tools_enabled && react::planner_active(ctx) {
        return match react::run_planner(ctx, node, &instruction, &specs).await? {
            PlannerOutcome::Parked => Ok(NodeOutcome::Park),
            PlannerOutcome::Final(answer) => {
                finish(ctx, node, &answer).await?;
                Ok(NodeOutcome::Advance)
            }
        };
    }

    let mut request = LlmRequest {
        contents: vec![Content::text("user", instruction.clone())],
        config: GenerateConfig {
            system_instruction: None,
            tools: specs.iter().cloned().map(FunctionDecl::from).collect(),
        },
    };
    if let Some(content) = user_content.take() {
        request.contents.push(content);
    }

    let tool_names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
    let mut final_text = String::new();

    for round in 0..MAX_TOOL_ROUNDS {
        if ctx.cancel.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        let turn = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(FlowError::Cancelled),
            turn = stream_turn(ctx, &request, tool_names.clone()) => turn,
        };
        let (response, buffer, intents) = match turn {
                Ok(turn) => turn,
                Err(e) if tools_enabled && e.is_tool_use_unsupported() => {
                    debug!(node = %node.name, "provider lacks tool support, switching to planner");
                    react::mark_fallback(ctx)?;
                    return match react::run_planner(ctx, node, &instruction, &specs).await? {
                        PlannerOutcome::Parked => Ok(NodeOutcome::Park),
                        PlannerOutcome::Final(answer) => {
                            finish(ctx, node, &answer).await?;
                            Ok(NodeOutcome::Advance)
                        }
                    };
                }
                Err(e) => return Err(e.into()),
            };

        let mut calls: Vec<FunctionCall> = response.function_calls.clone();
        calls.extend(intents.into_iter().map(|intent| FunctionCall {
            id: format!("intent-{}", Uuid::new_v4()),
            name: intent.name,
            args: Value::Object(intent.args),
        }));

        if calls.is_empty() {
            final_text = if response.text.is_empty() {
                buffer
            } else {
                response.text
            };
            break;
        }

        for call in calls {
            match approval::gate(node, &call.name, &call.args, &ctx.state, &ctx.sink).await? {
                GateDecision::Parked => return Ok(NodeOutcome::Park),
                GateDecision::Execute => {}
            }
            let tool = ctx.registry.lookup(&call.name).await?;
            let result = tool.invoke(call.args.clone()).await?;
            debug!(node = %node.name, tool = %call.name, round, "tool executed");
            route_raw_output(ctx, node, &result)?;
            ctx.sink.flush().await;

            request.contents.push(Content {
                role: "model".into(),
                parts: vec![Part::FunctionCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                }],
            });
            request.contents.push(Content {
                role: "user".into(),
                parts: vec![Part::FunctionResponse {
                    id: call.id,
                    response: result,
                }],
            });
        }
        if round + 1 == MAX_TOOL_ROUNDS {
            return Err(FlowError::Provider(crate::provider::ProviderError::Stream(
                format!("tool loop exceeded {MAX_TOOL_ROUNDS} rounds"),
            )));
        }
    }

    finish(ctx, node, &final_text).await?;
    Ok(NodeOutcome::Advance)
}

/// `render(system) + "\n\n" + render(prompt)`, plus the tool clause when the
/// node declares tools.
fn build_instruction(ctx: &ExecCtx, node: &NodeDef) -> String {
    let prompt = node
        .prompt
        .as_deref()
        .map(|p| render(p, &ctx.state))
        .unwrap_or_default();
    let mut instruction = match node.system.as_deref() {
        Some(system) => format!("{}\n\n{}", render(system, &ctx.state), prompt),
        None => prompt,
    };
    if node.tools || !node.tools_selection.is_empty() {
        instruction.push_str("\n\n");
        instruction.push_str(TOOL_USE_CLAUSE);
    }
    instruction
}

async fn selected_specs(ctx: &ExecCtx, node: &NodeDef) -> Result<Vec<ToolSpec>, FlowError> {
    let specs = if node.tools_selection.is_empty() {
        ctx.registry.specs().await?
    } else {
        ctx.registry.specs_for(&node.tools_selection).await?
    };
    Ok(specs)
}

/// One streamed provider turn: emits each text chunk as an event, scans the
/// running buffer for XML tool intents, returns the final response.
async fn stream_turn(
    ctx: &ExecCtx,
    request: &LlmRequest,
    known_tools: Vec<String>,
) -> Result<
    (
        crate::provider::LlmResponse,
        String,
        Vec<super::intent::ToolIntent>,
    ),
    crate::provider::ProviderError,
> {
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Chunk>(64);
    let generate = ctx.provider.generate_stream(request, Some(chunk_tx));

    let sink = ctx.sink.clone();
    let consume = async move {
        let mut scanner = IntentScanner::new(known_tools);
        let mut buffer = String::new();
        let mut intents = Vec::new();
        let mut stream_error: Option<String> = None;
        while let Some(chunk) = chunk_rx.recv().await {
            if let Some(message) = chunk.error {
                stream_error = Some(message);
                continue;
            }
            let Some(content) = chunk.content else {
                continue;
            };
            let text = content.joined_text();
            if text.is_empty() {
                continue;
            }
            buffer.push_str(&text);
            emit_text_chunk(&sink, &text).await;
            if let Some(intent) = scanner.push(&text) {
                intents.push(intent);
            }
        }
        (buffer, intents, stream_error)
    };

    let (result, (buffer, intents, stream_error)) = tokio::join!(generate, consume);
    let response = result?;
    if let Some(message) = stream_error {
        return Err(crate::provider::ProviderError::Stream(message));
    }
    Ok((response, buffer, intents))
}

async fn emit_text_chunk(sink: &EventSink, text: &str) {
    sink.emit(Event::text("model", text)).await;
}

/// Post-turn bookkeeping: output projection, then the user-message display
/// event.
async fn finish(ctx: &ExecCtx, node: &NodeDef, final_text: &str) -> Result<(), FlowError> {
    project_output(ctx, node, final_text).await?;
    ctx.sink.flush().await;
    emit_user_message(ctx, node).await;
    Ok(())
}

/// Asks the model to reformat the final answer into the declared keys and
/// writes them into state. A single-key model falls back to the raw answer
/// when the reformat is unparsable.
async fn project_output(ctx: &ExecCtx, node: &NodeDef, final_text: &str) -> Result<(), FlowError> {
    if node.output_model.is_empty() {
        return Ok(());
    }
    let mut spec_lines = String::new();
    for (key, type_tag) in node.output_model.iter() {
        spec_lines.push_str(&format!("- {key} ({type_tag})\n"));
    }
    let request = LlmRequest::from_instruction(format!(
        "Reformat the final answer below into a JSON object with exactly these keys:\n\
         {spec_lines}Respond with the JSON object only, no prose.\n\nFinal answer:\n{final_text}"
    ));
    let parsed: Option<Value> = match ctx.provider.generate(&request).await {
        Ok(response) => extract_json(&response.text).and_then(|j| serde_json::from_str(&j).ok()),
        Err(_) => None,
    };

    match parsed.as_ref().and_then(Value::as_object) {
        Some(map) => {
            for (key, _) in node.output_model.iter() {
                if let Some(value) = map.get(key) {
                    ctx.state
                        .set(key.clone(), value.clone())
                        .map_err(|e| FlowError::State(e.to_string()))?;
                }
            }
            Ok(())
        }
        None if node.output_model.len() == 1 => {
            let key = node.output_model.first_key().expect("single key");
            ctx.state
                .set(key.to_string(), Value::String(final_text.to_string()))
                .map_err(|e| FlowError::State(e.to_string()))
        }
        None => Err(FlowError::Provider(crate::provider::ProviderError::Stream(
            "output projection did not return parseable JSON".into(),
        ))),
    }
}

/// Routes declared tool-result fields straight into state.
pub(super) fn route_raw_output(
    ctx: &ExecCtx,
    node: &NodeDef,
    result: &Value,
) -> Result<(), FlowError> {
    if node.raw_tool_output.is_empty() {
        return Ok(());
    }
    for (state_key, field) in node.raw_tool_output.iter() {
        let value = result.get(field).cloned().unwrap_or(Value::Null);
        ctx.state
            .set(state_key.clone(), value)
            .map_err(|e| FlowError::State(e.to_string()))?;
    }
    Ok(())
}

/// Emits the single `_user_message_display` marker event. The displayed text
/// travels in the content; the field values never ride in this delta (they
/// were already emitted with the projection flush).
pub(super) async fn emit_user_message(ctx: &ExecCtx, node: &NodeDef) {
    if node.user_message.is_empty() {
        return;
    }
    let mut lines = Vec::new();
    for key in &node.user_message {
        if let Some(value) = ctx.state.get(key) {
            let text = value_to_display(&value);
            if !text.is_empty() {
                lines.push(text);
            }
        }
    }
    let event = Event::text("model", lines.join("\n"))
        .with_delta(keys::USER_MESSAGE_DISPLAY, json!(true));
    ctx.sink.emit(event).await;
}
