//! Parallel scatter: fan a node out over a list, merge outputs at fan-in.
//!
//! Each sibling runs with a copy-on-read fork of parent state binding the
//! loop variable (and optional index), writes only its declared output keys,
//! and streams events tagged with an opaque task id. A sibling failing
//! beyond retry asks the still-running siblings to cancel cooperatively;
//! their partial outputs are discarded. Merge policy per output key:
//! `output_action: append` accumulates a list in iteration order; otherwise
//! a key written more than one distinct value is rejected rather than
//! silently overwritten.

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{ExecCtx, NodeOutcome};
use crate::error::FlowError;
use crate::manifest::NodeDef;

pub(crate) async fn execute(ctx: &ExecCtx, node: &NodeDef) -> Result<NodeOutcome, FlowError> {
    let spec = node
        .parallel
        .as_ref()
        .ok_or_else(|| FlowError::Manifest(format!("node '{}' has no parallel block", node.name)))?;

    let items = ctx
        .state
        .get(&spec.for_each)
        .and_then(|v| v.as_array().cloned())
        .ok_or_else(|| {
            FlowError::State(format!(
                "parallel for_each key '{}' does not hold a list",
                spec.for_each
            ))
        })?;

    let output_keys: Vec<String> = node
        .output_model
        .keys()
        .chain(node.raw_tool_output.keys())
        .cloned()
        .collect();

    let semaphore = Arc::new(Semaphore::new(spec.max_concurrency.max(1)));
    let child_cancel = ctx.cancel.child_token();
    debug!(node = %node.name, items = items.len(), max_concurrency = spec.max_concurrency, "parallel scatter");

    let mut siblings = FuturesUnordered::new();
    for (index, item) in items.into_iter().enumerate() {
        let child_state = ctx.state.fork();
        child_state
            .set(spec.item_var.clone(), item)
            .map_err(|e| FlowError::State(e.to_string()))?;
        if let Some(index_var) = &spec.index_as {
            child_state
                .set(index_var.clone(), json!(index))
                .map_err(|e| FlowError::State(e.to_string()))?;
        }
        // Loop bindings are task-local, not outputs.
        child_state.take_delta();

        let child_ctx = ExecCtx {
            manifest: ctx.manifest.clone(),
            registry: ctx.registry.clone(),
            provider: ctx.provider.clone(),
            state: child_state.clone(),
            sink: ctx.sink.for_task(format!("task-{index}"), child_state.clone()),
            cancel: child_cancel.clone(),
        };
        let node = node.clone();
        let semaphore = semaphore.clone();
        let cancel = child_cancel.clone();
        let keys = output_keys.clone();

        siblings.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return Err(FlowError::Cancelled);
            };
            if cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }
            let mut no_user_content = None;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(FlowError::Cancelled),
                result = super::execute_with_retries(&child_ctx, &node, &mut no_user_content) => result,
            }?;
            match outcome {
                NodeOutcome::Advance => {
                    let outputs: Map<String, Value> = keys
                        .iter()
                        .filter_map(|k| child_ctx.state.get(k).map(|v| (k.clone(), v)))
                        .collect();
                    Ok((index, outputs))
                }
                NodeOutcome::Park => Err(FlowError::State(
                    "approval pause is not supported inside a parallel block".into(),
                )),
            }
        }));
    }

    let mut collected: Vec<(usize, Map<String, Value>)> = Vec::new();
    let mut failure: Option<FlowError> = None;
    while let Some(joined) = siblings.next().await {
        let result = joined.unwrap_or_else(|e| Err(FlowError::State(e.to_string())));
        match result {
            Ok(pair) => collected.push(pair),
            Err(FlowError::Cancelled) if failure.is_some() => {}
            Err(e) => {
                if failure.is_none() {
                    warn!(node = %node.name, error = %e, "parallel sibling failed, cancelling peers");
                    child_cancel.cancel();
                    failure = Some(e);
                }
            }
        }
    }
    if let Some(e) = failure {
        // Partial sibling outputs are discarded wholesale.
        return Err(e);
    }

    collected.sort_by_key(|(index, _)| *index);
    merge_outputs(ctx, node, &output_keys, &collected)?;
    ctx.sink.flush().await;
    Ok(NodeOutcome::Advance)
}

fn merge_outputs(
    ctx: &ExecCtx,
    node: &NodeDef,
    output_keys: &[String],
    collected: &[(usize, Map<String, Value>)],
) -> Result<(), FlowError> {
    for key in output_keys {
        let values: Vec<&Value> = collected
            .iter()
            .filter_map(|(_, outputs)| outputs.get(key))
            .filter(|v| !matches!(v, Value::Null) && !matches!(v, Value::String(s) if s.is_empty()))
            .collect();
        if values.is_empty() {
            continue;
        }
        if node.appends_parallel_output() {
            let list: Vec<Value> = values.into_iter().cloned().collect();
            ctx.state
                .set(key.clone(), Value::Array(list))
                .map_err(|e| FlowError::State(e.to_string()))?;
        } else {
            let mut distinct: Vec<&Value> = Vec::new();
            for v in &values {
                if !distinct.iter().any(|d| *d == *v) {
                    distinct.push(v);
                }
            }
            if distinct.len() > 1 {
                return Err(FlowError::State(format!(
                    "parallel siblings wrote conflicting values to '{key}'; declare output_action: append"
                )));
            }
            ctx.state
                .set(key.clone(), (*distinct[0]).clone())
                .map_err(|e| FlowError::State(e.to_string()))?;
        }
    }
    Ok(())
}
