use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `swe.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SweConfig {
    pub agent: AgentConfig,
    pub approval: ApprovalConfig,
    pub tools: ToolsConfig,
    pub subagents: SubAgentsConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent name; selects `~/.swe-workflow/<name>/`.
    pub name: String,
    /// Model identifier, e.g. "anthropic/claude-sonnet-4-20250514".
    pub model: String,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum model calls per user turn before the turn is aborted.
    pub max_cycles: u32,
    /// Retries for transient model failures (rate limits, 5xx, timeouts).
    pub model_retries: u32,
    /// Replaces the built-in base instructions when set.
    pub system_prompt_file: Option<PathBuf>,
    /// Tool results longer than this are truncated before entering the
    /// transcript. 0 disables truncation.
    pub tool_result_max_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".into(),
            model: "anthropic/claude-sonnet-4-20250514".into(),
            max_tokens: 8192,
            temperature: 0.0,
            max_cycles: 50,
            model_retries: 2,
            system_prompt_file: None,
            tool_result_max_chars: 50_000,
        }
    }
}

// ── Approval ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Approve every sensitive call without prompting.
    pub auto_approve: bool,
    /// Seconds to wait for an operator answer. 0 waits indefinitely; an
    /// expired wait counts as a rejection.
    pub timeout_secs: u64,
}

// ── Tools ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Active tool subset. Empty means every built-in tool.
    pub enabled: Vec<String>,
    pub shell_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_output_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![],
            shell_timeout_secs: 120,
            fetch_timeout_secs: 30,
            max_output_chars: 30_000,
        }
    }
}

// ── Sub-agents ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubAgentsConfig {
    /// How many sub-agents may run at once; further delegations queue.
    pub max_concurrent: usize,
    pub max_cycles: u32,
    /// Wall-clock limit per sub-agent. 0 disables it.
    pub timeout_secs: u64,
    /// Default tool subset for children. Empty means the parent's set.
    pub tools: Vec<String>,
    /// How many levels of delegation are allowed below the root agent.
    pub max_depth: u32,
}

impl Default for SubAgentsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_cycles: 30,
            timeout_secs: 600,
            tools: vec![],
            max_depth: 1,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "compact", "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "compact".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// Provider credentials. The config file wins; env vars fill gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    /// Any OpenAI-compatible endpoint (OpenRouter, Ollama, vLLM...).
    pub openai_base_url: Option<String>,
    /// Enables the `web_search` tool.
    pub tavily_api_key: Option<String>,
}

// ── Validation ─────────────────────────────────────────────────

/// A config validation finding.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

impl SweConfig {
    /// Check the config for mistakes. Returns warnings on success, or a
    /// joined error message when any finding is an Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent name ───
        if let Err(e) = crate::paths::validate_agent_name(&self.agent.name) {
            warnings.push(ConfigWarning {
                field: "agent.name".into(),
                message: e.to_string(),
                severity: WarningSeverity::Error,
                hint: Some("Use letters, digits, '-', '_' or spaces".into()),
            });
        }

        // ── Agent model ───
        let model = &self.agent.model;
        if model.is_empty() {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'anthropic/claude-sonnet-4-20250514' or 'openai/gpt-4o'".into()),
            });
        } else if !model.contains('/') {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: format!("model '{}' should be in 'provider/model' format", model),
                severity: WarningSeverity::Warning,
                hint: Some(
                    "Without a provider prefix the model goes to whichever provider lists it, or to the only configured provider".into(),
                ),
            });
        }

        // ── Temperature ───
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "agent.temperature".into(),
                message: format!("temperature {} is out of range", self.agent.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }

        // ── Max tokens ───
        if self.agent.max_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_tokens".into(),
                message: "max_tokens is 0, the model cannot answer".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 8192".into()),
            });
        }

        // ── Cycle limits ───
        if self.agent.max_cycles == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_cycles".into(),
                message: "max_cycles is 0, every turn would abort immediately".into(),
                severity: WarningSeverity::Error,
                hint: Some("The default is 50".into()),
            });
        }
        if self.subagents.max_cycles == 0 {
            warnings.push(ConfigWarning {
                field: "subagents.max_cycles".into(),
                message: "max_cycles is 0, sub-agents would always fail".into(),
                severity: WarningSeverity::Error,
                hint: Some("The default is 30".into()),
            });
        }
        if self.subagents.max_concurrent == 0 {
            warnings.push(ConfigWarning {
                field: "subagents.max_concurrent".into(),
                message: "max_concurrent is 0, delegation would wait forever".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to at least 1".into()),
            });
        }

        // ── Tool timeouts ───
        if self.tools.shell_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "tools.shell_timeout_secs".into(),
                message: "shell timeout is 0, every command would time out".into(),
                severity: WarningSeverity::Error,
                hint: Some("The default is 120".into()),
            });
        }
        if self.tools.fetch_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "tools.fetch_timeout_secs".into(),
                message: "fetch timeout is 0, every request would time out".into(),
                severity: WarningSeverity::Error,
                hint: Some("The default is 30".into()),
            });
        }

        // ── Auto-approve ───
        if self.approval.auto_approve {
            warnings.push(ConfigWarning {
                field: "approval.auto_approve".into(),
                message: "auto-approve is on, writes and shell commands run without confirmation".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
