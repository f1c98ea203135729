use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use swe_config::{ConfigLoader, SweConfig, WarningSeverity};
use swe_core::SweError;

mod agents;
mod chat;
mod render;
mod skills;
mod threads;

/// Terminal coding assistant: reads, edits and runs code with your approval.
#[derive(Parser)]
#[command(name = "swe-workflow", version, about, long_about = None)]
#[command(propagate_version = true, args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Path to swe.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Agent name; selects ~/.swe-workflow/<agent>/
    #[arg(short, long, global = true)]
    agent: Option<String>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(flatten)]
    chat: ChatArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for a chat session, the default command.
#[derive(Args, Debug, Default)]
pub(crate) struct ChatArgs {
    /// Resume a thread: the most recent one, or the given id (prefix ok)
    #[arg(short, long, num_args = 0..=1, value_name = "ID")]
    resume: Option<Option<String>>,

    /// Model to use, as provider/model
    #[arg(short, long)]
    model: Option<String>,

    /// Run every tool call without asking
    #[arg(long)]
    auto_approve: bool,

    /// Run a single task and exit; implies --auto-approve
    #[arg(long, requires = "task")]
    non_interactive: bool,

    /// The task for --non-interactive mode
    #[arg(short, long)]
    task: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List agents under ~/.swe-workflow/
    List,
    /// Reset the agent selected by --agent to the default memory, or copy
    /// another agent's
    Reset {
        /// Copy AGENTS.md from this agent instead of the default
        #[arg(long)]
        target: Option<String>,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Manage skills
    Skills {
        #[command(subcommand)]
        action: SkillAction,
    },
    /// Manage saved conversation threads
    Threads {
        #[command(subcommand)]
        action: ThreadAction,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Audit configuration
    Doctor,
    /// Write a starter swe.toml
    Init {
        /// Create in the current directory instead of ~/.swe-workflow/
        #[arg(long)]
        local: bool,
    },
    /// Show version and build info
    Version,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub(crate) enum SkillAction {
    /// List global and project skills
    List {
        /// Only show project skills
        #[arg(long)]
        project: bool,
    },
    /// Show a skill's header and instructions
    Info { name: String },
    /// Create a new skill from a template
    Create {
        name: String,
        /// One-line description for the skill header
        #[arg(short, long)]
        description: Option<String>,
        /// Create in the project's .swe-workflow/skills instead of the agent's
        #[arg(long)]
        project: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum ThreadAction {
    /// List saved threads, newest first. --agent filters by agent
    List {
        /// Number of threads to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Delete a thread
    Delete {
        /// Thread id (prefix ok)
        id: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    pub async fn run(self) -> swe_core::Result<()> {
        let loader = ConfigLoader::load(self.config.as_deref())?;
        let config_path = loader.path().to_path_buf();
        let mut config = loader.into_config();
        if let Some(agent) = &self.agent {
            config.agent.name = agent.clone();
        }

        self.init_tracing(&config);

        match self.command {
            None => chat::cmd_chat(config, self.chat).await,
            Some(Commands::List) => agents::cmd_list(),
            Some(Commands::Reset { target, yes }) => {
                agents::cmd_reset(&config.agent.name, target.as_deref(), yes)
            }
            Some(Commands::Skills { action }) => skills::cmd_skills(&config, action),
            Some(Commands::Threads { action }) => {
                threads::cmd_threads(action, self.agent.as_deref())
            }
            Some(Commands::Config { json }) => Self::cmd_config(&config, json),
            Some(Commands::Doctor) => Self::cmd_doctor(&config, &config_path),
            Some(Commands::Init { local }) => Self::cmd_init(local),
            Some(Commands::Version) => Self::cmd_version(),
            Some(Commands::Completions { shell }) => Self::cmd_completions(shell),
        }
    }

    /// RUST_LOG wins, then the command-line flags, then `logging.level`.
    /// Output goes to stderr so stdout carries only answers.
    fn init_tracing(&self, config: &SweConfig) {
        let level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        match config.logging.format.as_str() {
            "json" => builder.json().with_target(true).init(),
            "pretty" => builder.pretty().init(),
            _ => builder.compact().with_target(false).init(),
        }
    }

    fn cmd_config(config: &SweConfig, json: bool) -> swe_core::Result<()> {
        let mut shown = config.clone();
        // Never echo credentials.
        for key in [
            &mut shown.services.anthropic_api_key,
            &mut shown.services.openai_api_key,
            &mut shown.services.tavily_api_key,
        ] {
            if key.is_some() {
                *key = Some("********".into());
            }
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&shown)?);
        } else {
            let rendered = toml::to_string_pretty(&shown)
                .map_err(|e| SweError::Config(format!("cannot render config: {e}")))?;
            println!("{rendered}");
        }
        Ok(())
    }

    fn cmd_doctor(config: &SweConfig, config_path: &std::path::Path) -> swe_core::Result<()> {
        println!("🩺 swe-workflow doctor");
        println!();
        if config_path.exists() {
            println!("  📄 config: {}", config_path.display());
        } else {
            println!("  📄 config: {} (not found, using defaults)", config_path.display());
        }

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        let services = &config.services;
        let has_key = [&services.anthropic_api_key, &services.openai_api_key]
            .iter()
            .any(|k| k.as_deref().is_some_and(|k| !k.is_empty()));
        if !has_key {
            println!(
                "  ⚠️  services: no API key configured (set ANTHROPIC_API_KEY or OPENAI_API_KEY)"
            );
            warn_count += 1;
        }
        if services.tavily_api_key.is_none() {
            println!("  💡 services: web_search is off (set TAVILY_API_KEY to enable it)");
            info_count += 1;
        }
        if config.approval.auto_approve {
            println!("  💡 approval.auto_approve: every tool call runs without asking");
            info_count += 1;
        }

        println!();
        println!("  ⚠️  {warn_count} warnings, 💡 {info_count} suggestions");
        Ok(())
    }

    fn cmd_init(local: bool) -> swe_core::Result<()> {
        let dir = if local {
            std::env::current_dir()?
        } else {
            swe_config::paths::home_base_dir()
        };
        std::fs::create_dir_all(&dir)?;
        let config_path = dir.join("swe.toml");

        if config_path.exists() {
            println!("⚠️  {} already exists", config_path.display());
            return Ok(());
        }

        let starter = r#"# swe-workflow configuration

[agent]
name = "agent"
model = "anthropic/claude-sonnet-4-20250514"
# max_cycles = 50
# model_retries = 2
# system_prompt_file = "/path/to/instructions.md"

[approval]
auto_approve = false
# timeout_secs = 0        # 0 waits indefinitely

[tools]
# enabled = []            # empty enables every built-in tool
# shell_timeout_secs = 120

[subagents]
# max_concurrent = 4
# max_depth = 1           # 0 disables delegation

[logging]
level = "warn"
# format = "compact"      # compact, pretty or json

[services]
# anthropic_api_key = "sk-ant-..."   # or env: ANTHROPIC_API_KEY
# openai_api_key = "sk-..."          # or env: OPENAI_API_KEY
# tavily_api_key = "tvly-..."        # or env: TAVILY_API_KEY, enables web_search
"#;
        std::fs::write(&config_path, starter)?;
        println!("✅ Created {}", config_path.display());
        Ok(())
    }

    fn cmd_version() -> swe_core::Result<()> {
        println!("swe-workflow v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> swe_core::Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "swe-workflow", &mut std::io::stdout());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_is_chat() {
        let cli = Cli::try_parse_from(["swe-workflow"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.chat.resume.is_none());
    }

    #[test]
    fn test_resume_with_and_without_id() {
        let cli = Cli::try_parse_from(["swe-workflow", "--resume"]).unwrap();
        assert_eq!(cli.chat.resume, Some(None));

        let cli = Cli::try_parse_from(["swe-workflow", "--resume", "3f2a"]).unwrap();
        assert_eq!(cli.chat.resume, Some(Some("3f2a".into())));
    }

    #[test]
    fn test_non_interactive_requires_task() {
        assert!(Cli::try_parse_from(["swe-workflow", "--non-interactive"]).is_err());
        let cli = Cli::try_parse_from([
            "swe-workflow",
            "--non-interactive",
            "--task",
            "fix the build",
        ])
        .unwrap();
        assert!(cli.chat.non_interactive);
        assert_eq!(cli.chat.task.as_deref(), Some("fix the build"));
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["swe-workflow", "threads", "list", "-n", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Threads {
                action: ThreadAction::List { limit: 5, .. }
            })
        ));

        let cli = Cli::try_parse_from([
            "swe-workflow",
            "reset",
            "--agent",
            "coder",
            "--target",
            "agent",
        ])
        .unwrap();
        assert_eq!(cli.agent.as_deref(), Some("coder"));
        assert!(matches!(
            cli.command,
            Some(Commands::Reset { target: Some(t), .. }) if t == "agent"
        ));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
