use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use swe_approval::{ApprovalGate, ApprovalReceiver, SessionPolicy};
use swe_config::{ProjectLayout, SweConfig};
use swe_core::{EventBus, Result, SweError, ThreadId, ToolExecutor};
use swe_llm::ModelRouter;
use swe_llm::anthropic::AnthropicProvider;
use swe_llm::openai::OpenAiProvider;
use swe_memory::MemoryStore;
use swe_skills::SkillRegistry;

use crate::agent_loop::{AgentLoop, LoopSettings};
use crate::sub_agent::{SubAgentFactory, SubAgentSettings};
use crate::tool_dispatch::ToolDispatcher;
use crate::tools::{BuiltinTools, ToolSettings};

const BASE_INSTRUCTIONS: &str = r#"You are a software engineering agent working in the user's terminal. You read and change code, run commands, and look things up using your tools. Act with tools rather than describing what you would do.

## Working rules
- Explore before changing anything: use ls, glob, grep and read_file to learn the layout. Don't guess paths.
- Use edit_file for focused changes and write_file for new files or full rewrites.
- Read error output, fix the cause, and try again.
- Keep replies short. Put the detail into the work, not the prose.

## Planning
For tasks with several steps, keep a todo list with write_todos: 3-6 concrete items, exactly one in_progress at a time, each marked completed as soon as it is done. Skip the list for simple one-step requests.

## Delegation
Use the task tool for self-contained work that benefits from a fresh context, such as a broad search or an independent change. The sub-agent cannot see this conversation, so give it complete instructions.

## Approval
File writes and edits, shell commands, network requests and delegation need the user's approval. When the user rejects a call, accept the decision: do not retry the same call, say briefly what you will do instead, and suggest an alternative approach."#;

/// Everything a front end needs to drive one conversation.
pub struct Session {
    pub agent: AgentLoop,
    /// Approval prompts arrive here; the operator interface answers them.
    pub approvals: ApprovalReceiver,
    pub events: EventBus,
    pub layout: ProjectLayout,
    pub skills: SkillRegistry,
}

/// Assembles a [`Session`] from configuration and the on-disk layout.
///
/// Skills and memory are read once here; nothing reloads during the session.
pub struct SessionBuilder {
    config: SweConfig,
    layout: ProjectLayout,
    cwd: PathBuf,
    llm: Option<Arc<ModelRouter>>,
    executor: Option<Arc<dyn ToolExecutor>>,
    events: EventBus,
    auto_approve: Option<bool>,
    thread_id: Option<ThreadId>,
}

impl SessionBuilder {
    pub fn new(config: SweConfig, layout: ProjectLayout, cwd: impl Into<PathBuf>) -> Self {
        Self {
            config,
            layout,
            cwd: cwd.into(),
            llm: None,
            executor: None,
            events: EventBus::default(),
            auto_approve: None,
            thread_id: None,
        }
    }

    /// Use this router instead of building one from `[services]`.
    pub fn with_router(mut self, router: Arc<ModelRouter>) -> Self {
        self.llm = Some(router);
        self
    }

    /// Use this executor instead of the built-in tools.
    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Override `approval.auto_approve`.
    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = Some(enabled);
        self
    }

    /// Continue an existing thread.
    pub fn thread_id(mut self, id: ThreadId) -> Self {
        self.thread_id = Some(id);
        self
    }

    pub fn build(self) -> Result<Session> {
        let Self {
            config,
            layout,
            cwd,
            llm,
            executor,
            events,
            auto_approve,
            thread_id,
        } = self;

        let llm = match llm {
            Some(llm) => llm,
            None => Arc::new(build_router(&config, &events)?),
        };
        let executor: Arc<dyn ToolExecutor> = match executor {
            Some(executor) => executor,
            None => Arc::new(BuiltinTools::new(
                cwd.clone(),
                ToolSettings::from_config(&config.tools)
                    .with_search_key(config.services.tavily_api_key.clone()),
            )),
        };

        let skills = SkillRegistry::build(&layout.skill_scopes());
        let memory = MemoryStore::from_layout(&layout);
        if memory.ensure_global()? {
            info!(agent = %layout.agent_name(), "created agent directory");
        }
        let environment = environment_block(&cwd, &layout);
        let system_prompt = build_system_prompt(&config, &environment, &memory, &skills)?;

        let (gate, approvals) =
            ApprovalGate::channel(ApprovalGate::timeout_from_secs(config.approval.timeout_secs));
        let loop_settings = LoopSettings::from_config(&config.agent);

        let mut dispatcher =
            ToolDispatcher::new(Arc::clone(&executor), &config.tools.enabled).with_events(events.clone());
        if config.subagents.max_depth > 0 {
            let factory = SubAgentFactory::new(
                Arc::clone(&llm),
                Arc::clone(&executor),
                gate.clone(),
                loop_settings.clone(),
                SubAgentSettings::from_config(&config.subagents),
            )
            .with_events(events.clone())
            .with_environment(environment);
            dispatcher = dispatcher.with_delegation(factory);
        }

        let policy = SessionPolicy {
            auto_approve: auto_approve.unwrap_or(config.approval.auto_approve),
        };
        let mut agent = AgentLoop::new(llm, dispatcher, gate, loop_settings)
            .with_system_prompt(system_prompt)
            .with_policy(policy)
            .with_events(events.clone());
        if let Some(id) = thread_id {
            agent.set_thread_id(id);
        }

        info!(
            agent = %layout.agent_name(),
            model = %config.agent.model,
            project = ?layout.project_root(),
            tools = agent.tools().len(),
            skills = skills.count(),
            auto_approve = policy.auto_approve,
            "session ready"
        );

        Ok(Session {
            agent,
            approvals,
            events,
            layout,
            skills,
        })
    }
}

/// Register a provider for every configured API key.
pub fn build_router(config: &SweConfig, events: &EventBus) -> Result<ModelRouter> {
    let mut router = ModelRouter::new()
        .with_max_retries(config.agent.model_retries)
        .with_events(events.clone());
    let services = &config.services;

    if let Some(key) = services.anthropic_api_key.as_ref().filter(|k| !k.is_empty()) {
        let mut provider = AnthropicProvider::new(key.clone());
        if let Some(url) = &services.anthropic_base_url {
            provider = provider.with_base_url(url.clone());
        }
        router.add_provider(Arc::new(provider));
    }
    if let Some(key) = services.openai_api_key.as_ref().filter(|k| !k.is_empty()) {
        let mut provider = OpenAiProvider::new(key.clone());
        if let Some(url) = &services.openai_base_url {
            provider = provider.with_base_url(url.clone(), "openai".into());
        }
        router.add_provider(Arc::new(provider));
    }

    if !router.has_providers() {
        return Err(SweError::Config(
            "no model provider configured: set ANTHROPIC_API_KEY or OPENAI_API_KEY, \
             or add keys under [services] in swe.toml"
                .into(),
        ));
    }
    if router.resolve(&config.agent.model).is_none() {
        return Err(SweError::ModelNotFound(config.agent.model.clone()));
    }
    Ok(router)
}

/// Working directory, project root and skill locations, shared with
/// sub-agents.
pub fn environment_block(cwd: &Path, layout: &ProjectLayout) -> String {
    let mut block = String::from("## Environment\n");
    block.push_str(&format!("- Working directory: {}\n", cwd.display()));
    match layout.project_root() {
        Some(root) => block.push_str(&format!("- Project root: {}\n", root.display())),
        None => block.push_str("- Project root: none detected (no .git found)\n"),
    }
    block.push_str(
        "- Pass absolute paths to file tools. Relative paths resolve against the working directory.\n",
    );
    block.push_str(&format!(
        "- Global skills directory: {}\n",
        layout.global_skills_dir().display()
    ));
    if let Some(dir) = layout.project_skills_dir() {
        block.push_str(&format!("- Project skills directory: {}\n", dir.display()));
    }
    block.trim_end().to_string()
}

/// Base instructions (or the configured replacement), the environment, the
/// memory block and the skill catalog, in that order.
pub fn build_system_prompt(
    config: &SweConfig,
    environment: &str,
    memory: &MemoryStore,
    skills: &SkillRegistry,
) -> Result<String> {
    let base = match &config.agent.system_prompt_file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            SweError::Config(format!(
                "cannot read system_prompt_file {}: {e}",
                path.display()
            ))
        })?,
        None => BASE_INSTRUCTIONS.to_string(),
    };

    let mut sections = vec![base.trim_end().to_string(), environment.to_string()];
    if let Some(block) = memory.system_prompt_block() {
        sections.push(block);
    }
    if let Some(block) = skills.system_prompt_block() {
        sections.push(block);
    }

    let prompt = sections.join("\n\n");
    debug!(chars = prompt.len(), "system prompt assembled");
    Ok(prompt)
}
