//! Tool registry: name lookup across internal tools and lazy toolsets.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use super::{Tool, ToolError, ToolSpec, Toolset};

struct ToolsetEntry {
    set: Arc<dyn Toolset>,
    tools: OnceCell<Vec<Arc<dyn Tool>>>,
}

impl ToolsetEntry {
    async fn tools(&self) -> Result<&[Arc<dyn Tool>], ToolError> {
        let tools = self
            .tools
            .get_or_try_init(|| async {
                debug!(toolset = %self.set.name(), "initializing toolset");
                let tools = self.set.initialize().await?;
                // A toolset serving the same name twice has no precedence to
                // resolve it; reject at materialization.
                let mut seen: HashSet<&str> = HashSet::new();
                for tool in &tools {
                    if !seen.insert(tool.name()) {
                        return Err(ToolError::Duplicate(tool.name().to_string()));
                    }
                }
                Ok(tools)
            })
            .await
            .map_err(|e| match e {
                ToolError::Duplicate(name) => ToolError::Duplicate(name),
                other => ToolError::ToolsetInit {
                    name: self.set.name().to_string(),
                    message: other.to_string(),
                },
            })?;
        Ok(tools)
    }
}

/// Uniform registry for internal tools and external toolsets.
///
/// Lookup precedence: internal tools first, then toolsets in declaration
/// order; the first source owning a name wins. Each toolset is initialized
/// lazily on the first lookup or listing that reaches it, and the connection
/// is kept for the life of the registry.
#[derive(Default)]
pub struct ToolRegistry {
    internal: Vec<Arc<dyn Tool>>,
    toolsets: Vec<ToolsetEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-process tool. Duplicate internal names are rejected;
    /// a name already served by a toolset is allowed and shadows it.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        if self.internal.iter().any(|t| t.name() == tool.name()) {
            return Err(ToolError::Duplicate(tool.name().to_string()));
        }
        self.internal.push(tool);
        Ok(())
    }

    /// Registers an external toolset; position in declaration order fixes
    /// its precedence.
    pub fn register_toolset(&mut self, set: Arc<dyn Toolset>) {
        self.toolsets.push(ToolsetEntry {
            set,
            tools: OnceCell::new(),
        });
    }

    /// Resolves a tool by name following source precedence.
    pub async fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        if let Some(tool) = self.internal.iter().find(|t| t.name() == name) {
            return Ok(tool.clone());
        }
        for entry in &self.toolsets {
            if let Some(tool) = entry.tools().await?.iter().find(|t| t.name() == name) {
                return Ok(tool.clone());
            }
        }
        Err(ToolError::NotFound(name.to_string()))
    }

    /// Lists specs of all reachable tools; shadowed names appear once, from
    /// their highest-precedence source.
    pub async fn specs(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut specs = Vec::new();
        for tool in &self.internal {
            if seen.insert(tool.name().to_string()) {
                specs.push(tool.spec());
            }
        }
        for entry in &self.toolsets {
            for tool in entry.tools().await? {
                if seen.insert(tool.name().to_string()) {
                    specs.push(tool.spec());
                }
            }
        }
        Ok(specs)
    }

    /// Specs filtered to a node's `tools_selection`, in selection order.
    /// Unknown names are skipped (the manifest may name tools a session does
    /// not carry).
    pub async fn specs_for(&self, selection: &[String]) -> Result<Vec<ToolSpec>, ToolError> {
        let mut out = Vec::with_capacity(selection.len());
        for name in selection {
            match self.lookup(name).await {
                Ok(tool) => out.push(tool.spec()),
                Err(ToolError::NotFound(_)) => {
                    debug!(tool = %name, "selected tool not registered, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
