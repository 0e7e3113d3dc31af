//! `tool` nodes: invoke one declared tool directly, no model in the loop.

use serde_json::{Map, Value};
use tracing::debug;

use super::approval::{self, GateDecision};
use super::llm_node::{emit_user_message, route_raw_output};
use super::template::render;
use super::{ExecCtx, NodeOutcome};
use crate::error::FlowError;
use crate::manifest::NodeDef;

/// One attempt at a tool node. The declared tool is the first entry of
/// `tools_selection`; argument templates render against state. The call
/// passes the approval gate unless the node auto-approves.
pub(crate) async fn run_once(ctx: &ExecCtx, node: &NodeDef) -> Result<NodeOutcome, FlowError> {
    let name = node
        .tools_selection
        .first()
        .ok_or_else(|| FlowError::Manifest(format!("tool node '{}' has no tool", node.name)))?;

    let mut args = Map::new();
    for (key, template) in node.args.iter() {
        let rendered = render(template, &ctx.state);
        let value = serde_json::from_str(&rendered).unwrap_or(Value::String(rendered));
        args.insert(key.clone(), value);
    }
    let args = Value::Object(args);

    match approval::gate(node, name, &args, &ctx.state, &ctx.sink).await? {
        GateDecision::Parked => return Ok(NodeOutcome::Park),
        GateDecision::Execute => {}
    }

    let tool = ctx.registry.lookup(name).await?;
    let result = tool.invoke(args).await?;
    debug!(node = %node.name, tool = %name, "tool node executed");

    if !node.raw_tool_output.is_empty() {
        route_raw_output(ctx, node, &result)?;
    } else if let Some(first) = node.output_model.first_key() {
        ctx.state
            .set(first.to_string(), result)
            .map_err(|e| FlowError::State(e.to_string()))?;
    }
    ctx.sink.flush().await;
    emit_user_message(ctx, node).await;
    Ok(NodeOutcome::Advance)
}
