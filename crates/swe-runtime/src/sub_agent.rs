use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use swe_approval::{ApprovalGate, SessionPolicy};
use swe_config::schema::SubAgentsConfig;
use swe_core::{
    AgentEvent, EventBus, Tool, ToolCall, ToolError, ToolErrorKind, ToolExecutor, ToolOutput,
    Transcript,
};
use swe_llm::ModelRouter;

use crate::agent_loop::{AgentLoop, LoopSettings, TurnOutcome};
use crate::tool_dispatch::ToolDispatcher;

pub const TASK_TOOL: &str = "task";
pub const DEFAULT_SUBAGENT_TYPE: &str = "general-purpose";

/// Limits for delegated work.
#[derive(Debug, Clone)]
pub struct SubAgentSettings {
    /// Children one parent loop may run at once.
    pub max_concurrent: usize,
    pub max_cycles: u32,
    pub timeout: Option<Duration>,
    /// Tools a child gets when the call does not name any. Empty means the
    /// parent's full set.
    pub default_tools: Vec<String>,
    /// How deep delegation may nest. 1 lets the main agent delegate but not
    /// its children.
    pub max_depth: u32,
}

impl SubAgentSettings {
    pub fn from_config(config: &SubAgentsConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_cycles: config.max_cycles,
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
            default_tools: config.tools.clone(),
            max_depth: config.max_depth,
        }
    }
}

impl Default for SubAgentSettings {
    fn default() -> Self {
        Self::from_config(&SubAgentsConfig::default())
    }
}

/// What a child is asked to do, and with which tools.
#[derive(Debug, Clone, PartialEq)]
pub struct SubAgentTask {
    pub instructions: String,
    pub subagent_type: String,
    pub tools: Vec<String>,
}

impl SubAgentTask {
    /// Read a `task` call. The tool set is the requested one (or `defaults`,
    /// or the parent's), kept only where the parent has it. `task` itself is
    /// dropped unless nesting is allowed.
    pub fn from_call(
        call: &ToolCall,
        parent_tools: &[String],
        defaults: &[String],
        allow_nesting: bool,
    ) -> Result<Self, ToolError> {
        let instructions = call
            .str_arg("description")
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ToolError::validation("`task` needs a non-empty description"))?
            .to_string();
        let subagent_type = call
            .str_arg("subagent_type")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_SUBAGENT_TYPE)
            .to_string();

        let requested: Vec<String> = call
            .arguments
            .get("tools")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let wanted = if !requested.is_empty() {
            requested
        } else if !defaults.is_empty() {
            defaults.to_vec()
        } else {
            parent_tools.to_vec()
        };

        let mut tools: Vec<String> = Vec::new();
        for name in wanted {
            let usable = parent_tools.contains(&name) && (allow_nesting || name != TASK_TOOL);
            if usable && !tools.contains(&name) {
                tools.push(name);
            }
        }
        if tools.is_empty() {
            return Err(ToolError::validation(format!(
                "none of the requested tools are available to a sub-agent. Choose from: {}",
                parent_tools
                    .iter()
                    .filter(|t| allow_nesting || t.as_str() != TASK_TOOL)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(Self {
            instructions,
            subagent_type,
            tools,
        })
    }
}

/// Builds and runs child agent loops for the `task` tool.
///
/// Each child is a fresh [`AgentLoop`] with an empty transcript: it sees the
/// instructions and nothing of its parent's history, and only its final
/// answer travels back. Children share the model router, the tool executor
/// and the approval gate (so the same operator answers their prompts), and
/// start from a copy of the parent's policy.
#[derive(Clone)]
pub struct SubAgentFactory {
    llm: Arc<ModelRouter>,
    executor: Arc<dyn ToolExecutor>,
    gate: ApprovalGate,
    events: EventBus,
    loop_settings: LoopSettings,
    settings: Arc<SubAgentSettings>,
    permits: Arc<Semaphore>,
    environment: String,
    /// Depth of the children this factory creates.
    depth: u32,
}

impl SubAgentFactory {
    pub fn new(
        llm: Arc<ModelRouter>,
        executor: Arc<dyn ToolExecutor>,
        gate: ApprovalGate,
        loop_settings: LoopSettings,
        settings: SubAgentSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            llm,
            executor,
            gate,
            events: EventBus::default(),
            loop_settings,
            settings: Arc::new(settings),
            permits,
            environment: String::new(),
            depth: 1,
        }
    }

    /// Where sub-agent start/finish notices go.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Context appended to every child's system prompt (working directory
    /// and the like).
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Permits not currently held by a running child.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn allows_nesting(&self) -> bool {
        self.depth < self.settings.max_depth
    }

    /// Factory for the grandchildren of a child. It gets its own permits so a
    /// child waiting on its own delegations cannot starve its siblings.
    fn nested(&self) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(self.settings.max_concurrent.max(1))),
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    fn system_prompt(&self, subagent_type: &str) -> String {
        let role = match subagent_type {
            DEFAULT_SUBAGENT_TYPE => {
                "You handle one self-contained piece of a larger task: research, a focused change, or an investigation."
            }
            "researcher" => {
                "You are a research agent. Gather the information the task asks for, from files, commands or the web, and report concrete findings with paths and line numbers."
            }
            "coder" => {
                "You are a coding agent. Make the requested change completely, then build or test it and fix what breaks before finishing."
            }
            "reviewer" => {
                "You are a review agent. Read the code in question and report bugs, risky patterns and missing tests with file paths and line numbers. Do not modify files."
            }
            "tester" => {
                "You are a testing agent. Write or run tests for the code in question and report failures with their output."
            }
            _ => "You are a specialised agent. Carry out the assigned task with your tools.",
        };

        let mut prompt = format!(
            "You are a sub-agent of type '{subagent_type}'.\n\n{role}\n\n\
             Work autonomously; nobody will answer questions. When done, reply with a concise \
             final report. It is the only thing the delegating agent will see, so include every \
             result it needs."
        );
        if !self.environment.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.environment);
        }
        prompt
    }

    /// Run one `task` call to completion in an isolated child loop.
    ///
    /// Waits for a permit when the concurrency ceiling is reached. Boxed
    /// because the child loop may delegate again.
    pub fn run<'a>(
        &'a self,
        call: &'a ToolCall,
        parent_tools: &'a [String],
        policy: SessionPolicy,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let task = SubAgentTask::from_call(
                call,
                parent_tools,
                &self.settings.default_tools,
                self.allows_nesting(),
            )?;

            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolError::canceled()),
                permit = self.permits.acquire() => permit
                    .map_err(|_| ToolError::failed("sub-agent pool is closed"))?,
            };

            let mut dispatcher = ToolDispatcher::new(Arc::clone(&self.executor), &task.tools);
            if task.tools.iter().any(|t| t == TASK_TOOL) {
                dispatcher = dispatcher.with_delegation(self.nested());
            }
            let settings = LoopSettings {
                max_cycles: self.settings.max_cycles,
                ..self.loop_settings.clone()
            };
            let mut child = AgentLoop::new(
                Arc::clone(&self.llm),
                dispatcher,
                self.gate.clone(),
                settings,
            )
            .with_system_prompt(self.system_prompt(&task.subagent_type))
            .with_policy(policy);

            info!(
                call_id = %call.id,
                subagent_type = %task.subagent_type,
                depth = self.depth,
                tools = ?task.tools,
                "sub-agent started"
            );
            self.events.publish(AgentEvent::SubAgentStarted {
                call_id: call.id.clone(),
                subagent_type: task.subagent_type.clone(),
            });

            let child_cancel = cancel.child_token();
            let mut transcript = Transcript::new();
            let run = child.run_turn(&mut transcript, &task.instructions, &child_cancel);
            let outcome = match self.settings.timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(outcome) => Ok(outcome),
                    Err(_) => {
                        child_cancel.cancel();
                        Err(limit)
                    }
                },
                None => Ok(run.await),
            };

            let result = match outcome {
                Ok(TurnOutcome::Completed(answer)) => Ok(ToolOutput::text(answer).with_data(json!({
                    "subagent_type": task.subagent_type,
                    "turns": transcript.len(),
                }))),
                Ok(TurnOutcome::CycleLimitExceeded { cycles }) => Err(ToolError::new(
                    ToolErrorKind::SubAgentFailed,
                    format!("sub-agent stopped after {cycles} cycles without a final answer"),
                )),
                Ok(TurnOutcome::ModelFailed(reason)) => Err(ToolError::new(
                    ToolErrorKind::SubAgentFailed,
                    format!("sub-agent model call failed: {reason}"),
                )),
                Ok(TurnOutcome::Cancelled) => Err(ToolError::canceled()),
                Err(limit) => Err(ToolError::new(
                    ToolErrorKind::SubAgentFailed,
                    format!("sub-agent timed out after {limit:?}"),
                )),
            };

            match &result {
                Ok(_) => info!(call_id = %call.id, "sub-agent finished"),
                Err(e) => warn!(call_id = %call.id, error = %e, "sub-agent failed"),
            }
            self.events.publish(AgentEvent::SubAgentFinished {
                call_id: call.id.clone(),
                success: result.is_ok(),
            });
            result
        })
    }
}

pub fn task_tool() -> Tool {
    Tool::new(
        TASK_TOOL,
        "Delegate a self-contained task to a sub-agent with a fresh context. It sees only the \
         description you give it, so include every detail it needs, and returns a single final \
         report. Independent tasks requested together run in parallel.",
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Complete instructions for the sub-agent"
                },
                "subagent_type": {
                    "type": "string",
                    "description": "general-purpose (default), researcher, coder, reviewer or tester"
                },
                "tools": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict the sub-agent to these tools (default: your own)"
                }
            },
            "required": ["description"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tool_subset_is_intersected_with_parent() {
        let call = ToolCall::new(
            "c1",
            TASK_TOOL,
            json!({"description": "look around", "tools": ["ls", "shell", "read_file"]}),
        );
        let task =
            SubAgentTask::from_call(&call, &names(&["ls", "read_file", "task"]), &[], false).unwrap();
        assert_eq!(task.tools, names(&["ls", "read_file"]));
        assert_eq!(task.subagent_type, DEFAULT_SUBAGENT_TYPE);
        assert_eq!(task.instructions, "look around");
    }

    #[test]
    fn task_removed_at_depth_limit() {
        let call = ToolCall::new("c1", TASK_TOOL, json!({"description": "go"}));
        let parent = names(&["ls", "task"]);
        let task = SubAgentTask::from_call(&call, &parent, &[], false).unwrap();
        assert_eq!(task.tools, names(&["ls"]));
        let task = SubAgentTask::from_call(&call, &parent, &[], true).unwrap();
        assert_eq!(task.tools, names(&["ls", "task"]));
    }

    #[test]
    fn defaults_apply_when_call_names_no_tools() {
        let call = ToolCall::new("c1", TASK_TOOL, json!({"description": "go", "subagent_type": "reviewer"}));
        let task = SubAgentTask::from_call(
            &call,
            &names(&["ls", "read_file", "shell"]),
            &names(&["read_file", "grep"]),
            false,
        )
        .unwrap();
        assert_eq!(task.tools, names(&["read_file"]));
        assert_eq!(task.subagent_type, "reviewer");
    }

    #[test]
    fn empty_subset_is_a_validation_error() {
        let call = ToolCall::new("c1", TASK_TOOL, json!({"description": "go", "tools": ["shell"]}));
        let err = SubAgentTask::from_call(&call, &names(&["ls"]), &[], false).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Validation);
    }
}
