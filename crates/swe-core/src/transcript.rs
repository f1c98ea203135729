use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweError};
use crate::tool::{ToolCall, ToolResult};

/// One entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    User { text: String },
    AssistantText { text: String },
    ToolCallRequest { call: ToolCall },
    ToolCallResult { result: ToolResult },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn::AssistantText { text: text.into() }
    }

    fn char_len(&self) -> usize {
        match self {
            Turn::User { text } | Turn::AssistantText { text } => text.len(),
            Turn::ToolCallRequest { call } => call.tool_name.len() + call.arguments.to_string().len(),
            Turn::ToolCallResult { result } => result.content.len(),
        }
    }
}

/// Ordered, append-only conversation history.
///
/// Every `ToolCallResult` refers to exactly one earlier `ToolCallRequest`,
/// and a request is resolved at most once. Appends that would break this are
/// rejected, and deserialized transcripts are checked on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Turn>", into = "Vec<Turn>")]
pub struct Transcript {
    turns: Vec<Turn>,
    requested: HashSet<String>,
    open: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored turns, verifying the resolution invariant.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self> {
        let mut transcript = Self::new();
        for turn in turns {
            transcript.push(turn)?;
        }
        Ok(transcript)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    pub fn push_assistant_text(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
    }

    pub fn push_request(&mut self, call: ToolCall) -> Result<()> {
        if !self.requested.insert(call.id.clone()) {
            return Err(SweError::Transcript(format!(
                "duplicate tool call id `{}`",
                call.id
            )));
        }
        self.open.push(call.id.clone());
        self.turns.push(Turn::ToolCallRequest { call });
        Ok(())
    }

    pub fn push_result(&mut self, result: ToolResult) -> Result<()> {
        let Some(pos) = self.open.iter().position(|id| *id == result.tool_call_id) else {
            return Err(SweError::Transcript(format!(
                "result for `{}` has no unresolved request",
                result.tool_call_id
            )));
        };
        self.open.remove(pos);
        self.turns.push(Turn::ToolCallResult { result });
        Ok(())
    }

    pub fn push(&mut self, turn: Turn) -> Result<()> {
        match turn {
            Turn::User { text } => self.push_user(text),
            Turn::AssistantText { text } => self.push_assistant_text(text),
            Turn::ToolCallRequest { call } => self.push_request(call)?,
            Turn::ToolCallResult { result } => self.push_result(result)?,
        }
        Ok(())
    }

    /// Whether `id` has already been used by a request in this transcript.
    pub fn contains_call_id(&self, id: &str) -> bool {
        self.requested.contains(id)
    }

    /// Ids of requests that have no result yet, in request order.
    pub fn unresolved(&self) -> &[String] {
        &self.open
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::AssistantText { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Rough token estimate (~4 chars per token).
    pub fn estimate_tokens(&self) -> usize {
        self.turns.iter().map(Turn::char_len).sum::<usize>() / 4
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl TryFrom<Vec<Turn>> for Transcript {
    type Error = SweError;

    fn try_from(turns: Vec<Turn>) -> Result<Self> {
        Self::from_turns(turns)
    }
}

impl From<Transcript> for Vec<Turn> {
    fn from(t: Transcript) -> Self {
        t.turns
    }
}
