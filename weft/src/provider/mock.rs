//! Scripted provider for tests and dry runs.
//!
//! Replays a fixed script of steps (text, native function calls, or errors)
//! call by call, repeating the last step when the script runs out. Records
//! every request for assertions. Optional character-by-character streaming
//! exercises fragmented-stream handling in consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Chunk, FunctionCall, LlmRequest, LlmResponse, Provider, ProviderError};

/// One scripted model turn.
#[derive(Debug, Clone, Default)]
pub struct MockStep {
    pub text: String,
    pub function_calls: Vec<FunctionCall>,
    pub error: Option<String>,
    /// When set, the error is reported as `ToolUseUnsupported`.
    pub tool_use_unsupported: bool,
}

impl MockStep {
    /// Plain text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Reply carrying one native function call (plus optional preamble text).
    pub fn call(name: impl Into<String>, args: Value) -> Self {
        let name = name.into();
        Self {
            function_calls: vec![FunctionCall {
                id: format!("call-{name}"),
                name,
                args,
            }],
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Failing turn (transport error).
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Failing turn that signals the back-end cannot do native tool calling.
    pub fn no_tool_support() -> Self {
        Self {
            error: Some("No endpoints found that support tool use".into()),
            tool_use_unsupported: true,
            ..Self::default()
        }
    }
}

/// Provider replaying a script of [`MockStep`]s.
pub struct MockProvider {
    steps: Mutex<Vec<MockStep>>,
    requests: Mutex<Vec<LlmRequest>>,
    stream_by_char: AtomicBool,
}

impl MockProvider {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps: Mutex::new(steps),
            requests: Mutex::new(Vec::new()),
            stream_by_char: AtomicBool::new(false),
        }
    }

    /// Provider that always answers with the same text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![MockStep::text(text)])
    }

    /// Enables character-by-character streaming in `generate_stream`.
    pub fn with_stream_by_char(self) -> Self {
        self.stream_by_char.store(true, Ordering::SeqCst);
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests mutex poisoned").len()
    }

    fn next_step(&self) -> MockStep {
        let mut steps = self.steps.lock().expect("steps mutex poisoned");
        if steps.len() > 1 {
            steps.remove(0)
        } else {
            steps.first().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());
        let step = self.next_step();
        if let Some(message) = step.error {
            return Err(if step.tool_use_unsupported {
                ProviderError::ToolUseUnsupported(message)
            } else {
                ProviderError::Transport(message)
            });
        }
        Ok(LlmResponse {
            text: step.text,
            function_calls: step.function_calls,
        })
    }

    async fn generate_stream(
        &self,
        request: &LlmRequest,
        chunk_tx: Option<mpsc::Sender<Chunk>>,
    ) -> Result<LlmResponse, ProviderError> {
        let response = self.generate(request).await?;
        if let Some(tx) = chunk_tx {
            if self.stream_by_char.load(Ordering::SeqCst) {
                for c in response.text.chars() {
                    let _ = tx.send(Chunk::text(c.to_string())).await;
                }
            } else if !response.text.is_empty() {
                let _ = tx.send(Chunk::text(response.text.clone())).await;
            }
            for call in &response.function_calls {
                let _ = tx.send(Chunk::function_call(call)).await;
            }
            let _ = tx.send(Chunk::done()).await;
        }
        Ok(response)
    }
}
