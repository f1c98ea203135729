use jsonschema::Validator;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use swe_approval::SessionPolicy;
use swe_core::{
    AgentEvent, EventBus, TodoItem, TodoStatus, Tool, ToolCall, ToolError, ToolExecutor,
    ToolOutput,
};

use crate::sub_agent::{SubAgentFactory, TASK_TOOL, task_tool};

pub const TODO_TOOL: &str = "write_todos";

/// Maps tool calls to capabilities: the executor's tools, the session todo
/// list, and delegation to sub-agents.
///
/// The catalog is fixed at construction. Calls for names outside it and
/// calls whose arguments fail the tool's schema never reach a capability.
pub struct ToolDispatcher {
    executor: Arc<dyn ToolExecutor>,
    /// Active tool subset; empty allows everything offered.
    enabled: Vec<String>,
    catalog: Vec<Tool>,
    validators: HashMap<String, Validator>,
    todos: Arc<Mutex<Vec<TodoItem>>>,
    events: Option<EventBus>,
    delegation: Option<SubAgentFactory>,
}

impl ToolDispatcher {
    pub fn new(executor: Arc<dyn ToolExecutor>, enabled: &[String]) -> Self {
        let mut dispatcher = Self {
            executor,
            enabled: enabled.to_vec(),
            catalog: Vec::new(),
            validators: HashMap::new(),
            todos: Arc::new(Mutex::new(Vec::new())),
            events: None,
            delegation: None,
        };

        let mut offered = dispatcher.executor.tools();
        offered.push(todo_tool());
        for tool in offered {
            dispatcher.offer(tool);
        }
        for name in &dispatcher.enabled {
            if name != TASK_TOOL && !dispatcher.has_tool(name) {
                warn!(tool = %name, "enabled tool does not exist, ignoring");
            }
        }
        dispatcher
    }

    /// Offer the `task` tool, backed by `factory`. No-op when the active
    /// subset excludes it.
    pub fn with_delegation(mut self, factory: SubAgentFactory) -> Self {
        self.offer(task_tool());
        if self.has_tool(TASK_TOOL) {
            self.delegation = Some(factory);
        }
        self
    }

    /// Publish todo updates to the operator.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn allows(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n == name)
    }

    fn offer(&mut self, tool: Tool) {
        if !self.allows(&tool.name) || self.has_tool(&tool.name) {
            return;
        }
        match jsonschema::validator_for(&tool.parameters) {
            Ok(validator) => {
                self.validators.insert(tool.name.clone(), validator);
            }
            Err(e) => warn!(
                tool = %tool.name,
                error = %e,
                "tool schema does not compile, arguments will not be checked"
            ),
        }
        self.catalog.push(tool);
    }

    /// The tools offered to the model, in a stable order.
    pub fn catalog(&self) -> &[Tool] {
        &self.catalog
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.catalog.iter().map(|t| t.name.clone()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.catalog.iter().any(|t| t.name == name)
    }

    /// Current todo list.
    pub fn todos(&self) -> Vec<TodoItem> {
        self.todos.lock().clone()
    }

    /// Reject unknown tools and malformed arguments. Touches nothing.
    pub fn validate(&self, call: &ToolCall) -> Result<(), ToolError> {
        if !self.has_tool(&call.tool_name) {
            return Err(ToolError::not_found(format!(
                "unknown tool '{}'. Available tools: {}",
                call.tool_name,
                self.tool_names().join(", ")
            )));
        }
        if let Some(validator) = self.validators.get(&call.tool_name)
            && !validator.is_valid(&call.arguments)
        {
            let problems: Vec<String> = validator
                .iter_errors(&call.arguments)
                .map(|e| e.to_string())
                .collect();
            return Err(ToolError::validation(format!(
                "`{}`: {}",
                call.tool_name,
                problems.join("; ")
            )));
        }
        Ok(())
    }

    /// Validate and run one call. Approval has already been decided by the
    /// caller; `policy` is only passed on to sub-agents.
    pub async fn invoke(
        &self,
        call: &ToolCall,
        policy: SessionPolicy,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        self.validate(call)?;
        debug!(tool = %call.tool_name, call_id = %call.id, "dispatching tool call");

        match call.tool_name.as_str() {
            TODO_TOOL => self.write_todos(call),
            TASK_TOOL => match &self.delegation {
                Some(factory) => {
                    factory
                        .run(call, &self.tool_names(), policy, cancel)
                        .await
                }
                None => Err(ToolError::not_found("delegation is not available here")),
            },
            _ => self.executor.execute(call).await,
        }
    }

    fn write_todos(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let raw = call.arguments.get("todos").cloned().unwrap_or(Value::Null);
        let todos: Vec<TodoItem> = serde_json::from_value(raw)
            .map_err(|e| ToolError::validation(format!("malformed todo list: {e}")))?;

        let rendered = render_todos(&todos);
        *self.todos.lock() = todos.clone();
        if let Some(events) = &self.events {
            events.publish(AgentEvent::TodosUpdated { todos: todos.clone() });
        }

        let done = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        Ok(ToolOutput::text(format!(
            "Updated todo list ({done}/{} completed):\n{rendered}",
            todos.len()
        ))
        .with_data(json!({ "total": todos.len(), "completed": done })))
    }
}

pub fn render_todos(todos: &[TodoItem]) -> String {
    todos
        .iter()
        .map(|t| {
            let mark = match t.status {
                TodoStatus::Pending => "[ ]",
                TodoStatus::InProgress => "[~]",
                TodoStatus::Completed => "[x]",
            };
            format!("{mark} {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn todo_tool() -> Tool {
    Tool::new(
        TODO_TOOL,
        "Replace your working todo list. Use it for multi-step tasks: 3-6 concrete items, \
         exactly one in_progress at a time, marked completed as soon as each is done.",
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
                        },
                        "required": ["content", "status"]
                    }
                }
            },
            "required": ["todos"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use swe_core::ToolErrorKind;

    struct CountingExecutor {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ToolExecutor for CountingExecutor {
        fn tools(&self) -> Vec<Tool> {
            vec![Tool::new(
                "write_file",
                "write",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["file_path", "content"]
                }),
            )]
        }

        async fn execute(&self, _call: &ToolCall) -> Result<ToolOutput, ToolError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text("done"))
        }
    }

    fn dispatcher(enabled: &[&str]) -> (ToolDispatcher, Arc<CountingExecutor>) {
        let exec = Arc::new(CountingExecutor {
            runs: AtomicUsize::new(0),
        });
        let enabled: Vec<String> = enabled.iter().map(|s| s.to_string()).collect();
        (ToolDispatcher::new(exec.clone(), &enabled), exec)
    }

    #[tokio::test]
    async fn malformed_arguments_never_reach_the_executor() {
        let (d, exec) = dispatcher(&[]);
        let call = ToolCall::new("c1", "write_file", json!({"file_path": 42}));
        let err = d
            .invoke(&call, SessionPolicy::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Validation);
        assert_eq!(exec.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_and_disabled_tools_are_not_found() {
        let (d, _) = dispatcher(&["write_todos"]);
        assert!(!d.has_tool("write_file"));
        let call = ToolCall::new(
            "c1",
            "write_file",
            json!({"file_path": "a", "content": "b"}),
        );
        let err = d.validate(&call).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::NotFound);

        let err = d
            .validate(&ToolCall::new("c2", "rm_rf", json!({})))
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn todos_replace_the_list_and_notify() {
        let (d, _) = dispatcher(&[]);
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let d = d.with_events(events);

        let call = ToolCall::new(
            "c1",
            TODO_TOOL,
            json!({"todos": [
                {"content": "read code", "status": "completed"},
                {"content": "fix bug", "status": "in_progress"}
            ]}),
        );
        let out = d
            .invoke(&call, SessionPolicy::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.content.contains("1/2 completed"));
        assert!(out.content.contains("[~] fix bug"));
        assert_eq!(d.todos().len(), 2);
        assert!(matches!(
            rx.recv().await.unwrap(),
            AgentEvent::TodosUpdated { todos } if todos.len() == 2
        ));

        let bad = ToolCall::new(
            "c2",
            TODO_TOOL,
            json!({"todos": [{"content": "x", "status": "someday"}]}),
        );
        assert_eq!(d.validate(&bad).unwrap_err().kind, ToolErrorKind::Validation);
        assert_eq!(d.todos().len(), 2);
    }

    #[test]
    fn catalog_has_no_task_without_delegation() {
        let (d, _) = dispatcher(&[]);
        assert!(!d.has_tool(TASK_TOOL));
        assert!(d.has_tool(TODO_TOOL));
    }
}
