//! Provider abstraction: `generate(request) → streamed chunks + final response`.
//!
//! Providers translate the internal request shape to vendor wire formats;
//! the engine never contains vendor-specific logic. Streaming follows the
//! channel pattern: pass a `chunk_tx` and the provider sends [`Chunk`]s as
//! they arrive, still returning the complete [`LlmResponse`] at the end.

mod mock;

pub use mock::{MockProvider, MockStep};

use async_trait::async_trait;
use serde_json::Value;
use stream_event::{Content, Part};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::tools::ToolSpec;

/// Function declaration passed to the model when a node enables tools.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub description: Option<String>,
    pub parameters_schema: Value,
}

impl From<ToolSpec> for FunctionDecl {
    fn from(spec: ToolSpec) -> Self {
        Self {
            name: spec.name,
            description: spec.description,
            parameters_schema: spec.parameters_schema,
        }
    }
}

/// Request-level configuration: system text plus tool declarations.
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    pub system_instruction: Option<String>,
    pub tools: Vec<FunctionDecl>,
}

/// One model request: conversation contents plus config.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub contents: Vec<Content>,
    pub config: GenerateConfig,
}

impl LlmRequest {
    /// Single-turn request with one user message.
    pub fn from_instruction(instruction: impl Into<String>) -> Self {
        Self {
            contents: vec![Content::text("user", instruction)],
            config: GenerateConfig::default(),
        }
    }

    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.contents.push(Content::text("user", text));
    }

    pub fn push_model_text(&mut self, text: impl Into<String>) {
        self.contents.push(Content::text("model", text));
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDecl>) -> Self {
        self.config.tools = tools;
        self
    }
}

/// A native function call produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Final result of one generate call.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Concatenated assistant text.
    pub text: String,
    /// Native tool calls, in emission order.
    pub function_calls: Vec<FunctionCall>,
}

/// One streamed response chunk.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub content: Option<Content>,
    pub turn_complete: bool,
    pub error: Option<String>,
}

impl Chunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(Content::text("model", text)),
            ..Self::default()
        }
    }

    pub fn function_call(call: &FunctionCall) -> Self {
        Self {
            content: Some(Content {
                role: "model".into(),
                parts: vec![Part::FunctionCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                }],
            }),
            ..Self::default()
        }
    }

    pub fn done() -> Self {
        Self {
            turn_complete: true,
            ..Self::default()
        }
    }
}

/// Provider failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider rejected tool schemas: {0}")]
    ToolUseUnsupported(String),
    #[error("provider stream error: {0}")]
    Stream(String),
}

impl ProviderError {
    /// True when the failure means "this back-end cannot do native tool
    /// calling", the signal that flips the sticky ReAct fallback.
    pub fn is_tool_use_unsupported(&self) -> bool {
        match self {
            Self::ToolUseUnsupported(_) => true,
            Self::Transport(msg) | Self::Stream(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("no endpoints found that support tool use")
                    || lower.contains("does not support tool")
                    || lower.contains("tool use is not supported")
            }
        }
    }
}

/// LLM back-end seam.
///
/// **Interaction**: the LLM-node executor and the recovery analyzer call
/// this; implementations live outside the engine (`MockProvider` ships for
/// tests).
#[async_trait]
pub trait Provider: Send + Sync {
    /// One model turn; returns the complete response.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;

    /// Streaming variant. When `chunk_tx` is `Some`, implementations send
    /// [`Chunk`]s as they arrive and finish with a `turn_complete` chunk.
    /// The default implementation calls [`Provider::generate`] and emits the
    /// whole response as one chunk.
    async fn generate_stream(
        &self,
        request: &LlmRequest,
        chunk_tx: Option<mpsc::Sender<Chunk>>,
    ) -> Result<LlmResponse, ProviderError> {
        let response = self.generate(request).await?;
        if let Some(tx) = chunk_tx {
            if !response.text.is_empty() {
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
