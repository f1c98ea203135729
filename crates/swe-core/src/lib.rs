//! # swe-core
//!
//! Shared vocabulary for the swe-workflow coding agent: the transcript and its
//! resolution invariant, tool descriptors and calls, the sensitivity
//! classification used by the approval gate, and the error taxonomy.

pub mod error;
pub mod event;
pub mod tool;
pub mod transcript;
pub mod types;

pub use error::{Result, SweError, ToolError, ToolErrorKind};
pub use event::{AgentEvent, EventBus};
pub use tool::{Sensitivity, Tool, ToolCall, ToolExecutor, ToolOutput, ToolResult};
pub use transcript::{Transcript, Turn};
pub use types::*;
