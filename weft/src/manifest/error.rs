//! Manifest load errors: one variant per validation failure.

use thiserror::Error;

/// Error from parsing or validating a flow manifest. Surfaced at load time;
/// never retried.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest parse error: {0}")]
    Parse(String),

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("transition {location} references unknown node '{reference}'")]
    UnknownNode { reference: String, location: String },

    #[error("no transition from START")]
    MissingStart,

    #[error("no transition reaches END")]
    MissingEnd,

    #[error("node '{node}' ({kind}) requires field '{field}'")]
    MissingField {
        node: String,
        kind: String,
        field: String,
    },

    #[error("invalid flow: {0}")]
    InvalidFlow(String),
}
