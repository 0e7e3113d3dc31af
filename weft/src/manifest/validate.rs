//! Load-time manifest validation.
//!
//! Mirrors what the engine assumes at runtime: unique node names, resolvable
//! transitions, a single START entry with a literal target, a path to END,
//! and kind-specific required fields.

use std::collections::HashSet;

use super::{Manifest, ManifestError, NodeKind, END, START};

pub(super) fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    let mut names: HashSet<&str> = HashSet::new();
    for node in &manifest.nodes {
        if !names.insert(node.name.as_str()) {
            return Err(ManifestError::DuplicateNode(node.name.clone()));
        }
        if node.name == START || node.name == END {
            return Err(ManifestError::InvalidFlow(format!(
                "node name '{}' is reserved",
                node.name
            )));
        }
        validate_node_fields(node)?;
    }

    let start_transitions: Vec<_> = manifest.flow.iter().filter(|t| t.from == START).collect();
    match start_transitions.len() {
        0 => return Err(ManifestError::MissingStart),
        1 => {
            if start_transitions[0].to.is_none() {
                return Err(ManifestError::InvalidFlow(
                    "START transition must use a literal 'to'".into(),
                ));
            }
        }
        _ => {
            return Err(ManifestError::InvalidFlow(
                "multiple transitions from START".into(),
            ))
        }
    }

    let mut reaches_end = false;
    for transition in &manifest.flow {
        if transition.from != START && !names.contains(transition.from.as_str()) {
            return Err(ManifestError::UnknownNode {
                reference: transition.from.clone(),
                location: format!("from '{}'", transition.from),
            });
        }
        match (&transition.to, transition.edges.is_empty()) {
            (Some(_), false) => {
                return Err(ManifestError::InvalidFlow(format!(
                    "transition from '{}' has both 'to' and 'edges'",
                    transition.from
                )))
            }
            (None, true) => {
                return Err(ManifestError::InvalidFlow(format!(
                    "transition from '{}' has neither 'to' nor 'edges'",
                    transition.from
                )))
            }
            _ => {}
        }
        for target in transition.targets() {
            if target == END {
                reaches_end = true;
            } else if !names.contains(target) {
                return Err(ManifestError::UnknownNode {
                    reference: target.to_string(),
                    location: format!("from '{}'", transition.from),
                });
            }
        }
    }
    if !reaches_end {
        return Err(ManifestError::MissingEnd);
    }

    Ok(())
}

fn validate_node_fields(node: &super::NodeDef) -> Result<(), ManifestError> {
    let missing = |field: &str| ManifestError::MissingField {
        node: node.name.clone(),
        kind: node.kind.as_str().to_string(),
        field: field.to_string(),
    };
    match node.kind {
        NodeKind::Input => {
            if node.output_model.is_empty() {
                return Err(missing("output_model"));
            }
            if node.prompt.is_none() {
                return Err(missing("prompt"));
            }
        }
        NodeKind::Llm => {
            if node.prompt.is_none() {
                return Err(missing("prompt"));
            }
        }
        NodeKind::Tool => {
            if node.tools_selection.is_empty() {
                return Err(missing("tools_selection"));
            }
        }
        NodeKind::UpdateState => {
            if node.updates.is_empty() {
                return Err(missing("updates"));
            }
        }
        NodeKind::Output => {
            if node.prompt.is_none() {
                return Err(missing("prompt"));
            }
        }
    }
    if let Some(parallel) = &node.parallel {
        if parallel.for_each.is_empty() || parallel.item_var.is_empty() {
            return Err(ManifestError::InvalidFlow(format!(
                "node '{}' parallel block needs for_each and as",
                node.name
            )));
        }
    }
    Ok(())
}
