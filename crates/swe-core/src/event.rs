use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::ToolErrorKind;
use crate::types::{ThreadId, TodoItem, Usage};

/// Progress notifications emitted while a turn runs. The CLI renders these;
/// nothing in the loop depends on anyone listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    // ── Turn lifecycle ─────────────────────────────────────────
    TurnStarted {
        thread_id: ThreadId,
    },
    ModelCall {
        cycle: u32,
    },
    ModelRetry {
        attempt: u32,
        error: String,
    },
    AssistantText {
        text: String,
    },
    TurnFinished {
        cycles: u32,
        usage: Usage,
    },

    // ── Tool calls ─────────────────────────────────────────────
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        summary: String,
    },
    ApprovalDecided {
        call_id: String,
        tool_name: String,
        approved: bool,
    },
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        error: Option<ToolErrorKind>,
    },
    TodosUpdated {
        todos: Vec<TodoItem>,
    },

    // ── Sub-agents ─────────────────────────────────────────────
    SubAgentStarted {
        call_id: String,
        subagent_type: String,
    },
    SubAgentFinished {
        call_id: String,
        success: bool,
    },
}

/// A broadcast-based event bus.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AgentEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
