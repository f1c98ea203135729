use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use swe_core::{Result, Tool, ToolCall, Turn, Usage};

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The model to use. The router strips the `provider/` prefix before the
    /// request reaches an adapter.
    pub model: String,
    /// System prompt (sent separately for providers that support it).
    pub system: Option<String>,
    /// The full transcript so far.
    pub turns: Vec<Turn>,
    /// The active tool catalog.
    pub tools: Vec<Tool>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A final answer; the turn is over.
    Final(String),
    /// One or more tool calls, in the order the model listed them. Any text
    /// the model produced alongside them is kept as `preamble`.
    ToolCalls {
        preamble: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl ModelOutput {
    /// Build from raw adapter output: tool calls win over text.
    pub fn from_parts(text: String, calls: Vec<ToolCall>) -> Self {
        if calls.is_empty() {
            ModelOutput::Final(text)
        } else {
            let preamble = (!text.trim().is_empty()).then_some(text);
            ModelOutput::ToolCalls { preamble, calls }
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        matches!(self, ModelOutput::ToolCalls { .. })
    }
}

/// A complete response from an LLM.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub output: ModelOutput,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFilter,
}

/// Trait implemented by each LLM provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Routing name, matched against the `provider/` prefix of a model id.
    fn name(&self) -> &str;

    /// Models this provider is known to serve (used for prefix-less ids).
    fn models(&self) -> Vec<String>;

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is reachable.
    async fn health_check(&self) -> Result<()>;
}
