//! Tool abstraction: uniform handles for internal and external tools.
//!
//! A tool is a name, a spec (description + JSON-Schema parameters), and an
//! `invoke(args) → result | failure`. Internal (in-process) tools and
//! external toolsets register uniformly in [`ToolRegistry`]; lookup resolves
//! collisions by source precedence (internal first, then toolsets in
//! declaration order).

mod registry;
mod scripted;

pub use registry::ToolRegistry;
pub use scripted::ScriptedTool;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Tool specification sent to providers as a function declaration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON-Schema object describing the arguments.
    pub parameters_schema: Value,
}

/// Errors from registering, resolving, or invoking tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("duplicate tool name: {0}")]
    Duplicate(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error("toolset '{name}' initialization failed: {message}")]
    ToolsetInit { name: String, message: String },
}

/// One callable tool.
///
/// Invocation is synchronous from the engine's perspective (it blocks the
/// current node) but runs in a cooperative task that never blocks peer
/// sessions.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name across all registered sources.
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Executes the tool. `args` is a JSON object; the result is a JSON map
    /// (structured fields routable via `raw_tool_output`).
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;
}

/// A named group of external tools, lazily initialized on first use and held
/// open for the life of the process.
///
/// The transport behind `initialize` (subprocess, HTTP, …) is the caller's
/// concern; the engine only sees the resulting [`Tool`] handles.
#[async_trait]
pub trait Toolset: Send + Sync {
    fn name(&self) -> &str;

    /// Connects to the backing server and lists its tools. Called at most
    /// once per registry; the result is cached.
    async fn initialize(&self) -> Result<Vec<std::sync::Arc<dyn Tool>>, ToolError>;
}
