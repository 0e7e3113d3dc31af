//! Transitions: how the cursor moves between nodes.

use serde::{Deserialize, Serialize};

/// One conditional edge: first truthy `condition` wins, evaluated top to
/// bottom. A missing condition is always truthy (catch-all).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Transition out of a node: either a literal `to`, or an ordered `edges`
/// list of predicates over session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,
}

impl Transition {
    /// All target node names this transition can reach.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.to
            .as_deref()
            .into_iter()
            .chain(self.edges.iter().map(|e| e.to.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: targets() yields the literal `to` or every edge target.
    #[test]
    fn targets_cover_literal_and_edges() {
        let t: Transition = serde_yaml::from_str("from: a\nto: b\n").unwrap();
        assert_eq!(t.targets().collect::<Vec<_>>(), vec!["b"]);

        let t: Transition = serde_yaml::from_str(
            "from: a\nedges:\n  - to: fast\n    condition: \"x['mode'] == 'fast'\"\n  - to: slow\n",
        )
        .unwrap();
        assert_eq!(t.targets().collect::<Vec<_>>(), vec!["fast", "slow"]);
        assert!(t.edges[1].condition.is_none(), "catch-all edge");
    }
}
