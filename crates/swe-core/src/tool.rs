use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// Tools that never change anything outside the process. Everything else,
/// including names we have never heard of, is treated as sensitive.
pub const READ_ONLY_TOOLS: &[&str] = &["ls", "read_file", "glob", "grep", "write_todos"];

/// Whether a call needs operator approval before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    ReadOnly,
    Sensitive,
}

impl Sensitivity {
    /// Classify a tool by name. Pure: the same name always yields the same class.
    pub fn of(tool_name: &str) -> Self {
        if READ_ONLY_TOOLS.contains(&tool_name) {
            Sensitivity::ReadOnly
        } else {
            Sensitivity::Sensitive
        }
    }

    pub fn is_sensitive(self) -> bool {
        self == Sensitivity::Sensitive
    }
}

/// Description of a tool offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    pub fn sensitivity(&self) -> Sensitivity {
        Sensitivity::of(&self.name)
    }
}

/// A request from the model to call a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Derived from the tool name alone, never from the arguments.
    pub fn sensitivity(&self) -> Sensitivity {
        Sensitivity::of(&self.tool_name)
    }

    /// String argument lookup used by the executors and previews.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// The result of executing (or refusing) a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<crate::ToolErrorKind>,
    /// Optional structured data returned alongside the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: output.content,
            is_error: false,
            error_kind: None,
            data: output.data,
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: error.to_string(),
            is_error: true,
            error_kind: Some(error.kind),
            data: None,
        }
    }

    pub fn from_outcome(
        tool_call_id: impl Into<String>,
        outcome: std::result::Result<ToolOutput, ToolError>,
    ) -> Self {
        match outcome {
            Ok(output) => Self::success(tool_call_id, output),
            Err(e) => Self::failure(tool_call_id, &e),
        }
    }
}

/// What a successful tool execution produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub data: Option<Value>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Trait implemented by anything that can execute tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// List all tools this executor provides.
    fn tools(&self) -> Vec<Tool>;

    /// Execute a single, already-validated tool call.
    async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolOutput, ToolError>;
}
