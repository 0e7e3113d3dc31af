//! Reserved session-state keys used by the pause/resume and approval protocol.
//!
//! Single place for protocol strings so the engine, tests, and front-ends
//! never drift on spelling.

/// Cursor: the currently-executing or next-to-execute node name. Never null
/// once the flow starts; terminal value is `"END"`.
pub const CURRENT_NODE: &str = "current_node";

/// True while a tool invocation waits for human approval.
pub const AWAITING_APPROVAL: &str = "awaiting_approval";
/// Name of the tool pending approval.
pub const APPROVAL_TOOL: &str = "approval_tool";
/// Arguments of the pending invocation.
pub const APPROVAL_ARGS: &str = "approval_args";
/// Choices offered to the user for the pending approval.
pub const APPROVAL_OPTIONS: &str = "approval_options";

/// Choices offered by an input node.
pub const INPUT_OPTIONS: &str = "input_options";
/// True while an input node waits for user content.
pub const WAITING_FOR_INPUT: &str = "waiting_for_input";

/// Sticky flag: once set, every LLM node runs through the local ReAct
/// planner because the provider rejected native tool schemas.
pub const USE_REACT_FALLBACK: &str = "_use_react_fallback";

/// Marker-only key on events that carry user-visible text. Never holds the
/// displayed values themselves.
pub const USER_MESSAGE_DISPLAY: &str = "_user_message_display";

/// Surfaced to the UI when a node retry is scheduled.
pub const RETRY_INFO: &str = "_retry_info";
/// Surfaced to the UI when a node aborts after exhausting retries.
pub const FAILURE_INFO: &str = "_failure_info";

/// Prefix for ephemeral bookkeeping keys.
pub const TEMP_PREFIX: &str = "temp:";
/// Node kind of the step being entered.
pub const TEMP_NODE_TYPE: &str = "temp:node_type";
/// Names of nodes visited so far, in order.
pub const TEMP_VISITED: &str = "temp:visited";
/// Short status line for spinner-style UI updates (e.g. planner iterations).
pub const TEMP_STATUS: &str = "temp:status";

/// Per-event flag marking output of a silent node.
pub const SILENT: &str = "silent";

/// Node-scoped, single-use approval grant for `tool` at `node`. Set true on
/// user approval; consumed (set false) immediately after tool execution.
pub fn approval_key(node: &str, tool: &str) -> String {
    format!("approval:{node}:{tool}")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Approval keys are node-scoped; different nodes yield
    /// different keys for the same tool.
    #[test]
    fn approval_key_is_node_scoped() {
        assert_eq!(approval_key("fetch", "search"), "approval:fetch:search");
        assert_ne!(approval_key("a", "t"), approval_key("b", "t"));
    }
}
