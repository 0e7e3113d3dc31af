//! Scripted tool for tests and dry runs.
//!
//! Returns queued results (or failures) per call, repeating the last entry
//! when the script runs out, and records every invocation for assertions.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolError, ToolSpec};

/// One scripted outcome: a result map or an error message.
type Outcome = Result<Value, String>;

/// Tool whose invocations replay a fixed script.
pub struct ScriptedTool {
    name: String,
    description: Option<String>,
    script: Mutex<Vec<Outcome>>,
    calls: Mutex<Vec<Value>>,
}

impl ScriptedTool {
    /// Tool that always succeeds with `result`.
    pub fn ok(name: impl Into<String>, result: Value) -> Self {
        Self::with_script(name, vec![Ok(result)])
    }

    /// Tool that always fails with `message`.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_script(name, vec![Err(message.into())])
    }

    /// Tool replaying `script` call by call; the last entry repeats.
    pub fn with_script(name: impl Into<String>, script: Vec<Outcome>) -> Self {
        Self {
            name: name.into(),
            description: None,
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Arguments of every invocation so far, in call order.
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls mutex poisoned").len()
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters_schema: json!({"type": "object"}),
        }
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        self.calls.lock().expect("calls mutex poisoned").push(args);
        let mut script = self.script.lock().expect("script mutex poisoned");
        let outcome = if script.len() > 1 {
            script.remove(0)
        } else {
            script
                .first()
                .cloned()
                .unwrap_or_else(|| Ok(json!({"result": "ok"})))
        };
        outcome.map_err(ToolError::Execution)
    }
}
