//! Flow manifest: nodes + transitions, parsed from YAML and validated at load.
//!
//! A manifest is immutable once loaded. Every `from`/`to` must reference a
//! defined node name or the reserved names [`START`]/[`END`]. Unknown
//! top-level keys are ignored; the `layout` block (positional metadata for
//! visual editors) is preserved round-trip as a raw value.

mod error;
mod node;
mod transition;
mod validate;

pub use error::ManifestError;
pub use node::{
    NodeDef, NodeKind, OrderedMap, ParallelSpec, RetryStrategy, UpdateAction, UpdateSpec,
};
pub use transition::{Edge, Transition};

use serde::{Deserialize, Serialize};

/// Reserved name for flow entry: the single transition `from: START` selects
/// the first node.
pub const START: &str = "START";

/// Reserved name for flow exit: a transition `to: END` terminates the flow.
pub const END: &str = "END";

/// An external toolset the flow depends on: a named group of tools served by
/// an out-of-process backend, initialized lazily on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsetRequirement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The whole authored flow: description, nodes, transitions, and external
/// tool requirements.
///
/// **Interaction**: loaded once per invocation via [`Manifest::from_yaml`];
/// read by the flow engine; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub nodes: Vec<NodeDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow: Vec<Transition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_dependencies: Vec<ToolsetRequirement>,
    /// Arbitrary positional metadata for visual editors; preserved verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_yaml::Value>,
}

impl Manifest {
    /// Parses and validates a manifest from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest =
            serde_yaml::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))?;
        validate::validate(&manifest)?;
        Ok(manifest)
    }

    /// Serializes back to YAML; `layout` and unknown-order details survive a
    /// load/save cycle.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        serde_yaml::to_string(self).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Looks up a node by name.
    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Returns the transition out of `from` (a node name or [`START`]).
    pub fn transition_from(&self, from: &str) -> Option<&Transition> {
        self.flow.iter().find(|t| t.from == from)
    }

    /// Name of the first node (target of the START transition).
    ///
    /// Validation guarantees exactly one START transition with a literal `to`.
    pub fn first_node(&self) -> Option<&str> {
        self.transition_from(START).and_then(|t| t.to.as_deref())
    }

    /// All state keys any node declares in `output_model` or
    /// `raw_tool_output`; these are seeded to `""` at START.
    pub fn declared_state_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for node in &self.nodes {
            for (k, _) in node.output_model.iter() {
                if !keys.contains(k) {
                    keys.push(k.clone());
                }
            }
            for (k, _) in node.raw_tool_output.iter() {
                if !keys.contains(k) {
                    keys.push(k.clone());
                }
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINEAR: &str = r#"
description: greet the user
nodes:
  - name: ask
    type: input
    prompt: "name?"
    output_model:
      name: str
  - name: greet
    type: llm
    prompt: "Hello {name}"
    output_model:
      greeting: str
    user_message:
      - greeting
flow:
  - from: START
    to: ask
  - from: ask
    to: greet
  - from: greet
    to: END
"#;

    /// **Scenario**: A well-formed linear manifest parses; lookups resolve.
    #[test]
    fn linear_manifest_parses_and_resolves() {
        let m = Manifest::from_yaml(LINEAR).expect("valid manifest");
        assert_eq!(m.description, "greet the user");
        assert_eq!(m.first_node(), Some("ask"));
        assert_eq!(m.node("greet").unwrap().kind, NodeKind::Llm);
        assert_eq!(m.transition_from("ask").unwrap().to.as_deref(), Some("greet"));
        assert_eq!(m.declared_state_keys(), vec!["name".to_string(), "greeting".to_string()]);
    }

    /// **Scenario**: Unknown top-level keys are ignored; layout survives a
    /// load/save round-trip.
    #[test]
    fn unknown_keys_ignored_layout_preserved() {
        let text = format!("{LINEAR}\nfuture_field: 42\nlayout:\n  ask: [0, 1]\n");
        let m = Manifest::from_yaml(&text).expect("valid manifest");
        let layout = m.layout.clone().expect("layout kept");
        assert!(layout.get("ask").is_some());

        let saved = m.to_yaml().expect("serializes");
        let reloaded = Manifest::from_yaml(&saved).expect("round-trips");
        assert!(reloaded
            .layout
            .as_ref()
            .expect("layout survives")
            .get("ask")
            .is_some());
        assert_eq!(reloaded.nodes.len(), m.nodes.len());
        assert_eq!(
            reloaded.node("ask").unwrap().output_model,
            m.node("ask").unwrap().output_model
        );
    }

    /// **Scenario**: A transition to an undefined node fails at load.
    #[test]
    fn undefined_target_rejected() {
        let text = LINEAR.replace("to: greet", "to: missing");
        let err = Manifest::from_yaml(&text).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownNode { .. }), "{err}");
    }

    /// **Scenario**: Duplicate node names fail at load.
    #[test]
    fn duplicate_node_rejected() {
        let text = LINEAR.replace("name: greet", "name: ask");
        let err = Manifest::from_yaml(&text).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateNode(n) if n == "ask"), );
    }

    /// **Scenario**: A flow with no START transition fails at load.
    #[test]
    fn missing_start_rejected() {
        let text = LINEAR.replace("from: START", "from: ask");
        let err = Manifest::from_yaml(&text).unwrap_err();
        assert!(
            matches!(err, ManifestError::MissingStart | ManifestError::InvalidFlow(_)),
            "{err}"
        );
    }
}
