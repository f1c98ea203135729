use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the swe-workflow runtime.
///
/// Failures of individual tool calls are not represented here: those are
/// values ([`ToolError`]) that get recorded in the transcript and shown to
/// the model. `SweError` covers everything that stops an operation outright.
#[derive(Error, Debug)]
pub enum SweError {
    // ── Agent errors ───────────────────────────────────────────
    #[error("agent error: {0}")]
    Agent(String),

    #[error("invalid agent name: {0}")]
    InvalidAgentName(String),

    #[error("transcript invariant violated: {0}")]
    Transcript(String),

    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    // ── Approval errors ────────────────────────────────────────
    #[error("approval channel closed: {0}")]
    ApprovalChannelClosed(String),

    // ── Skills / memory errors ─────────────────────────────────
    #[error("skill error: {0}")]
    Skill(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SweError>;

/// Category of a failed tool call, as recorded in its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Arguments did not match the tool's parameter schema.
    Validation,
    /// The tool (or a file/skill it addressed) does not exist.
    NotFound,
    PermissionDenied,
    ExecutionFailed,
    Timeout,
    /// The operator rejected the call.
    Declined,
    /// The turn was interrupted before the call completed.
    Canceled,
    SubAgentFailed,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ToolErrorKind::Validation => "invalid arguments",
            ToolErrorKind::NotFound => "not found",
            ToolErrorKind::PermissionDenied => "permission denied",
            ToolErrorKind::ExecutionFailed => "execution failed",
            ToolErrorKind::Timeout => "timed out",
            ToolErrorKind::Declined => "declined by user",
            ToolErrorKind::Canceled => "canceled",
            ToolErrorKind::SubAgentFailed => "sub-agent failed",
        };
        f.write_str(label)
    }
}

/// A tool call failure. Recorded as the call's result; never aborts a turn.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ExecutionFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, message)
    }

    /// The operator said no. The message tells the model not to retry.
    pub fn declined(tool_name: &str) -> Self {
        Self::new(
            ToolErrorKind::Declined,
            format!(
                "The user rejected the `{tool_name}` call. Do not retry the same call; \
                 acknowledge the decision and suggest an alternative approach."
            ),
        )
    }

    pub fn canceled() -> Self {
        Self::new(
            ToolErrorKind::Canceled,
            "The turn was interrupted by the user before this call completed.",
        )
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ToolErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ToolErrorKind::PermissionDenied,
            _ => ToolErrorKind::ExecutionFailed,
        };
        Self::new(kind, e.to_string())
    }
}
