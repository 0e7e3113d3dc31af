//! `update_state` nodes: pure state mutation verbs.

use serde_json::Value;

use super::template::render;
use crate::error::FlowError;
use crate::manifest::{NodeDef, UpdateAction};
use crate::state::SessionState;

/// Applies every update entry of the node, in declaration order.
pub(crate) fn apply(node: &NodeDef, state: &SessionState) -> Result<(), FlowError> {
    for update in &node.updates {
        let incoming = if let Some(source) = &update.source_variable {
            state.get(source).unwrap_or(Value::Null)
        } else {
            literal_value(update.value.as_ref(), state)?
        };
        match update.action {
            UpdateAction::Set => {
                state
                    .set(update.key.clone(), incoming)
                    .map_err(|e| FlowError::State(e.to_string()))?;
            }
            UpdateAction::Append => {
                let next = match state.get(&update.key) {
                    Some(Value::Array(mut items)) => {
                        items.push(incoming);
                        Value::Array(items)
                    }
                    // Seeded "" and missing keys start a fresh list.
                    None | Some(Value::Null) => Value::Array(vec![incoming]),
                    Some(Value::String(s)) if s.is_empty() => Value::Array(vec![incoming]),
                    Some(existing) => Value::Array(vec![existing, incoming]),
                };
                state
                    .set(update.key.clone(), next)
                    .map_err(|e| FlowError::State(e.to_string()))?;
            }
            UpdateAction::Increment => {
                let current = state
                    .get(&update.key)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                let step = incoming.as_f64().unwrap_or(1.0);
                let next = current + step;
                let number = if next.fract() == 0.0 {
                    Value::from(next as i64)
                } else {
                    Value::from(next)
                };
                state
                    .set(update.key.clone(), number)
                    .map_err(|e| FlowError::State(e.to_string()))?;
            }
        }
    }
    Ok(())
}

/// Converts the YAML literal; string literals render templates against state.
fn literal_value(
    value: Option<&serde_yaml::Value>,
    state: &SessionState,
) -> Result<Value, FlowError> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };
    let json = serde_json::to_value(value)
        .map_err(|e| FlowError::Manifest(format!("unrepresentable update value: {e}")))?;
    Ok(match json {
        Value::String(s) => Value::String(render(&s, state)),
        other => other,
    })
}
