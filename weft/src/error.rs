//! Flow execution error types.
//!
//! One enum per failure kind the engine can surface; retry-eligible errors are
//! classified by the recovery analyzer and never reach the caller until
//! retries are exhausted.

use thiserror::Error;

use crate::predicate::PredicateError;
use crate::provider::ProviderError;
use crate::tools::ToolError;

/// Error surfaced by the flow engine or one of its node executors.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Manifest problem discovered after load time (e.g. a node kind with a
    /// missing required field reached execution).
    #[error("manifest error: {0}")]
    Manifest(String),

    /// State write rejected by the persistence layer; fatal to the current
    /// step, the cursor does not advance.
    #[error("state error: {0}")]
    State(String),

    /// No transition out of a node matched.
    #[error("no matching transition from node '{0}'")]
    NoMatchingTransition(String),

    /// Provider failure that survived the retry loop.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Tool failure that survived the retry loop.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// Node retries exhausted; carries the last underlying error message.
    #[error("node '{node}' failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        node: String,
        attempts: u32,
        message: String,
    },

    /// The run was cancelled by the caller.
    #[error("run cancelled")]
    Cancelled,

    /// Session bookkeeping failure (unknown session, append rejected).
    #[error("session error: {0}")]
    Session(String),
}

impl From<PredicateError> for FlowError {
    fn from(e: PredicateError) -> Self {
        // Predicate failures are normally swallowed as "condition didn't
        // match"; this conversion exists for callers that evaluate predicates
        // directly.
        FlowError::Manifest(format!("predicate: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display formats name the failure kind and carry the message.
    #[test]
    fn flow_error_display_variants() {
        let s = FlowError::NoMatchingTransition("gate".into()).to_string();
        assert!(s.contains("gate"), "{s}");
        let s = FlowError::RetriesExhausted {
            node: "fetch".into(),
            attempts: 3,
            message: "rate limit".into(),
        }
        .to_string();
        assert!(s.contains("fetch") && s.contains("3") && s.contains("rate limit"), "{s}");
        assert_eq!(FlowError::Cancelled.to_string(), "run cancelled");
    }
}
