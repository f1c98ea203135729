use console::style;
use std::io::Write;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use swe_approval::{ApprovalDecision, ApprovalReceiver};
use swe_config::{ProjectLayout, SweConfig};
use swe_core::{AgentEvent, Result, SweError, Transcript};
use swe_runtime::{
    AgentLoop, Session, SessionBuilder, ThreadRecord, ThreadStore, TurnOutcome, render_todos,
};

use super::ChatArgs;
use super::render::Renderer;

const HELP: &str = "\
Commands:
  /help     Show this help
  /clear    Start a new thread
  /tokens   Show approximate conversation size and tokens used
  /todos    Show the current todo list
  /auto     Toggle auto-approve
  /quit     Exit (also /exit)

Approval answers: y = approve, n = reject, a = approve everything for this session.
Ctrl+C interrupts the running turn.";

pub(super) async fn cmd_chat(mut config: SweConfig, args: ChatArgs) -> Result<()> {
    if let Some(model) = &args.model {
        config.agent.model = model.clone();
    }
    let cwd = std::env::current_dir()?;
    let layout = ProjectLayout::discover(&config.agent.name, &cwd)?;
    let store = ThreadStore::from_layout(&layout);

    let record = match &args.resume {
        None => ThreadRecord::new(layout.agent_name()),
        Some(None) => match store.latest(layout.agent_name())? {
            Some(record) => record,
            None => {
                eprintln!(
                    "{}",
                    style(format!(
                        "No saved threads for agent '{}', starting a new one.",
                        layout.agent_name()
                    ))
                    .dim()
                );
                ThreadRecord::new(layout.agent_name())
            }
        },
        Some(Some(id)) => store.find(id)?,
    };

    let auto_approve = args.auto_approve || args.non_interactive;
    let mut builder = SessionBuilder::new(config, layout, &cwd).thread_id(record.id);
    if auto_approve {
        builder = builder.auto_approve(true);
    }
    let session = builder.build()?;

    match (args.non_interactive, args.task) {
        (true, Some(task)) => run_batch(session, store, record, &task).await,
        _ => run_interactive(session, store, record).await,
    }
}

/// One turn, auto-approved, answer on stdout. Anything but a final answer is
/// an error so the exit status reflects it.
async fn run_batch(
    session: Session,
    store: ThreadStore,
    mut record: ThreadRecord,
    task: &str,
) -> Result<()> {
    let Session {
        mut agent,
        approvals,
        events,
        ..
    } = session;
    // Auto-approve never asks; dropping the receiver turns any stray prompt
    // into a rejection.
    drop(approvals);

    let mut renderer = Renderer::batch();
    let mut event_rx = events.subscribe();
    let cancel = CancellationToken::new();
    let mut transcript = record.transcript.clone();

    let outcome = {
        let turn = agent.run_turn(&mut transcript, task, &cancel);
        tokio::pin!(turn);
        loop {
            tokio::select! {
                outcome = &mut turn => break outcome,
                event = event_rx.recv() => {
                    if let Ok(event) = event
                        && !matches!(event, AgentEvent::AssistantText { .. })
                    {
                        renderer.event(&event);
                    }
                }
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        }
    };

    record.update(&transcript);
    save(&store, &record);

    match outcome {
        TurnOutcome::Completed(answer) => {
            println!("{answer}");
            Ok(())
        }
        TurnOutcome::CycleLimitExceeded { cycles } => Err(SweError::Agent(format!(
            "stopped after {cycles} cycles without a final answer"
        ))),
        TurnOutcome::ModelFailed(reason) => Err(SweError::Agent(format!(
            "model call failed: {reason}"
        ))),
        TurnOutcome::Cancelled => Err(SweError::Agent("interrupted".into())),
    }
}

async fn run_interactive(
    session: Session,
    store: ThreadStore,
    mut record: ThreadRecord,
) -> Result<()> {
    let Session {
        mut agent,
        mut approvals,
        events,
        layout,
        skills,
    } = session;

    println!("{}", style("swe-workflow").bold().cyan());
    println!(
        "   agent {} · {} tools · {} skills{}",
        style(layout.agent_name()).bold(),
        agent.tools().len(),
        skills.count(),
        match layout.project_root() {
            Some(root) => format!(" · project {}", root.display()),
            None => String::new(),
        }
    );
    if agent.policy().auto_approve {
        println!("   {}", style("auto-approve is ON").yellow());
    }
    if !record.transcript.is_empty() {
        println!(
            "   resumed thread {} ({} turns){}",
            short_id(&record),
            record.transcript.len(),
            record
                .title
                .as_deref()
                .map(|t| format!(": {t}"))
                .unwrap_or_default()
        );
    }
    println!("   Type /help for commands.");
    println!();

    let mut input = spawn_stdin_reader();
    let mut renderer = Renderer::interactive();
    let mut event_rx = events.subscribe();
    let mut transcript = record.transcript.clone();

    loop {
        prompt("you>");
        let Some(line) = input.recv().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('/') {
            match line {
                "/quit" | "/exit" => break,
                "/help" => println!("{HELP}"),
                "/clear" => {
                    record = ThreadRecord::new(layout.agent_name());
                    transcript.clear();
                    agent.set_thread_id(record.id);
                    println!("{}", style("Started a new thread.").dim());
                }
                "/tokens" => {
                    let usage = agent.usage();
                    println!(
                        "   ~{} tokens in the conversation; {} in / {} out used this session",
                        transcript.estimate_tokens(),
                        usage.input_tokens,
                        usage.output_tokens
                    );
                }
                "/todos" => {
                    let todos = agent.dispatcher().todos();
                    if todos.is_empty() {
                        println!("   No todos.");
                    } else {
                        println!("{}", render_todos(&todos));
                    }
                }
                "/auto" => {
                    let on = agent.toggle_auto_approve();
                    println!("   auto-approve {}", if on { "ON" } else { "OFF" });
                }
                other => println!("Unknown command {other}. Type /help."),
            }
            continue;
        }

        let outcome = run_turn(
            &mut agent,
            &mut transcript,
            line,
            &mut approvals,
            &mut input,
            &mut event_rx,
            &mut renderer,
        )
        .await;
        renderer.outcome(&outcome);

        record.update(&transcript);
        save(&store, &record);
        println!();
    }

    renderer.clear();
    println!("👋 Goodbye!");
    Ok(())
}

/// Drive one turn while answering approval prompts and rendering progress.
#[allow(clippy::too_many_arguments)]
async fn run_turn(
    agent: &mut AgentLoop,
    transcript: &mut Transcript,
    line: &str,
    approvals: &mut ApprovalReceiver,
    input: &mut mpsc::Receiver<String>,
    event_rx: &mut broadcast::Receiver<AgentEvent>,
    renderer: &mut Renderer,
) -> TurnOutcome {
    let cancel = CancellationToken::new();
    let turn = agent.run_turn(transcript, line, &cancel);
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            Some((request, respond)) = approvals.recv() => {
                renderer.approval(&request);
                let decision = tokio::select! {
                    answer = ask_decision(input) => answer,
                    _ = tokio::signal::ctrl_c() => {
                        cancel.cancel();
                        ApprovalDecision::Rejected
                    }
                };
                info!(tool = %request.tool_name, ?decision, "operator answered");
                // The loop may already have moved on after a cancel.
                let _ = respond.send(decision);
            }
            event = event_rx.recv() => match event {
                Ok(event) => renderer.event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "display fell behind, events dropped")
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => cancel.cancel(),
        }
    };

    // Events published after the last poll, e.g. the final answer.
    while let Ok(event) = event_rx.try_recv() {
        renderer.event(&event);
    }
    outcome
}

async fn ask_decision(input: &mut mpsc::Receiver<String>) -> ApprovalDecision {
    loop {
        prompt("   Approve? [y]es / [n]o / [a]lways>");
        let Some(answer) = input.recv().await else {
            // stdin closed
            return ApprovalDecision::Rejected;
        };
        match parse_decision(&answer) {
            Some(decision) => {
                let label = match decision {
                    ApprovalDecision::Approved => style("   ✅ Approved").green(),
                    ApprovalDecision::ApprovedForSession => {
                        style("   ✅ Approved (auto-approve now ON)").green()
                    }
                    ApprovalDecision::Rejected => style("   ❌ Rejected").red(),
                };
                eprintln!("{label}");
                return decision;
            }
            None => eprintln!("   Please answer y, n or a."),
        }
    }
}

fn parse_decision(answer: &str) -> Option<ApprovalDecision> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "approve" => Some(ApprovalDecision::Approved),
        "n" | "no" | "reject" => Some(ApprovalDecision::Rejected),
        "a" | "always" | "auto" => Some(ApprovalDecision::ApprovedForSession),
        _ => None,
    }
}

/// Lines from stdin, read on their own task so a turn can wait on the
/// operator and the model at once.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

fn prompt(label: &str) {
    eprint!("{} ", style(label).cyan());
    std::io::stderr().flush().ok();
}

fn save(store: &ThreadStore, record: &ThreadRecord) {
    if let Err(e) = store.save(record) {
        warn!(thread = %record.id, error = %e, "could not save thread");
    }
}

fn short_id(record: &ThreadRecord) -> String {
    record.id.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decision() {
        assert_eq!(parse_decision("y"), Some(ApprovalDecision::Approved));
        assert_eq!(parse_decision(" YES "), Some(ApprovalDecision::Approved));
        assert_eq!(parse_decision("n"), Some(ApprovalDecision::Rejected));
        assert_eq!(parse_decision("a"), Some(ApprovalDecision::ApprovedForSession));
        assert_eq!(parse_decision("maybe"), None);
    }
}
