//! Terminal rendering for the operator: progress, approval prompts and turn
//! outcomes. Everything except the assistant's text goes to stderr.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use swe_approval::ApprovalRequest;
use swe_core::{AgentEvent, ToolErrorKind, Usage};
use swe_runtime::{TurnOutcome, render_todos};

const DIFF_MAX_LINES: usize = 80;

pub(super) struct Renderer {
    spinner: Option<ProgressBar>,
    /// Plain output for --non-interactive runs.
    quiet_progress: bool,
}

impl Renderer {
    pub fn interactive() -> Self {
        Self {
            spinner: None,
            quiet_progress: false,
        }
    }

    pub fn batch() -> Self {
        Self {
            spinner: None,
            quiet_progress: true,
        }
    }

    fn spin(&mut self, message: &str) {
        if self.quiet_progress {
            return;
        }
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.to_string()),
            None => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg:.dim}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(message.to_string());
                spinner.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(spinner);
            }
        }
    }

    /// Stop the spinner before printing anything else.
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    pub fn event(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::TurnStarted { .. } => {}
            AgentEvent::ModelCall { .. } => self.spin("Thinking…"),
            AgentEvent::ModelRetry { attempt, error } => {
                self.clear();
                eprintln!(
                    "{}",
                    style(format!("   ↻ model call failed, retry {attempt}: {error}")).yellow()
                );
            }
            AgentEvent::AssistantText { text } => {
                self.clear();
                println!("{} {text}", style("●").green());
            }
            AgentEvent::ToolCallStarted { summary, .. } => {
                self.clear();
                eprintln!("{} {}", style("⏺").cyan(), style(summary).bold());
                self.spin("Running…");
            }
            AgentEvent::ApprovalDecided { .. } => {}
            AgentEvent::ToolCallFinished {
                tool_name, error, ..
            } => {
                if let Some(kind) = error {
                    self.clear();
                    let line = format!("   ⎿ {tool_name}: {kind}");
                    match kind {
                        ToolErrorKind::Declined | ToolErrorKind::Canceled => {
                            eprintln!("{}", style(line).yellow())
                        }
                        _ => eprintln!("{}", style(line).red()),
                    }
                }
            }
            AgentEvent::TodosUpdated { todos } => {
                self.clear();
                eprintln!("{}", style("   Todos").bold());
                for line in render_todos(todos).lines() {
                    eprintln!("   {line}");
                }
            }
            AgentEvent::SubAgentStarted { subagent_type, .. } => {
                self.clear();
                eprintln!(
                    "{}",
                    style(format!("   ↳ sub-agent ({subagent_type}) started")).magenta()
                );
                self.spin("Sub-agent working…");
            }
            AgentEvent::SubAgentFinished { success, .. } => {
                self.clear();
                let line = if *success {
                    style("   ↳ sub-agent finished".to_string()).magenta()
                } else {
                    style("   ↳ sub-agent failed".to_string()).red()
                };
                eprintln!("{line}");
            }
            AgentEvent::TurnFinished { usage, .. } => {
                self.clear();
                if !self.quiet_progress {
                    eprintln!("{}", style(usage_line(usage)).dim());
                }
            }
        }
    }

    /// Show what a sensitive call is about to do.
    pub fn approval(&mut self, request: &ApprovalRequest) {
        self.clear();
        let preview = &request.preview;
        eprintln!();
        eprintln!("{}", style("⚠️  Approval required").yellow().bold());
        eprintln!("   {}", style(&preview.title).bold());
        for (label, value) in &preview.fields {
            if value.contains('\n') {
                eprintln!("   {}:", style(label).dim());
                for line in value.lines() {
                    eprintln!("     {line}");
                }
            } else {
                eprintln!("   {} {value}", style(format!("{label}:")).dim());
            }
        }
        if let Some(error) = &preview.error {
            eprintln!("   {}", style(format!("Error: {error}")).red());
        }
        if let Some(diff) = &preview.diff {
            eprintln!();
            let total = diff.lines().count();
            for line in diff.lines().take(DIFF_MAX_LINES) {
                let styled = if line.starts_with("+++") || line.starts_with("---") {
                    style(line).bold()
                } else if line.starts_with('+') {
                    style(line).green()
                } else if line.starts_with('-') {
                    style(line).red()
                } else if line.starts_with("@@") {
                    style(line).cyan()
                } else {
                    style(line).dim()
                };
                eprintln!("   {styled}");
            }
            if total > DIFF_MAX_LINES {
                eprintln!("   {}", style(format!("… {} more lines", total - DIFF_MAX_LINES)).dim());
            }
        }
        eprintln!();
    }

    /// Report turns that did not end in an answer.
    pub fn outcome(&mut self, outcome: &TurnOutcome) {
        self.clear();
        match outcome {
            TurnOutcome::Completed(_) => {}
            TurnOutcome::CycleLimitExceeded { cycles } => eprintln!(
                "{}",
                style(format!(
                    "⚠️  Stopped after {cycles} cycles without a final answer. The conversation is kept; send a follow-up to continue."
                ))
                .yellow()
            ),
            TurnOutcome::ModelFailed(reason) => {
                eprintln!("{}", style(format!("❌ Model call failed: {reason}")).red())
            }
            TurnOutcome::Cancelled => eprintln!("{}", style("⏹  Interrupted").yellow()),
        }
    }
}

pub(super) fn usage_line(usage: &Usage) -> String {
    format!(
        "   [{} in / {} out tokens]",
        usage.input_tokens, usage.output_tokens
    )
}
