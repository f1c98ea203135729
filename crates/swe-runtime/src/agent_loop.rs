use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use swe_approval::{ApprovalGate, SessionPolicy};
use swe_config::schema::AgentConfig;
use swe_core::{
    AgentEvent, EventBus, Sensitivity, ThreadId, Tool, ToolCall, ToolError, ToolResult,
    Transcript, Usage,
};
use swe_llm::{LlmRequest, ModelOutput, ModelRouter};

use crate::sub_agent::TASK_TOOL;
use crate::tool_dispatch::ToolDispatcher;

/// Tools whose effects cannot be safely abandoned half-way. Once started they
/// run to completion even if the turn is interrupted.
const NON_CANCELLABLE: &[&str] = &["shell", "write_file", "edit_file"];

/// Per-loop model and budget settings.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_cycles: u32,
    /// Longer tool results keep their head and tail. 0 disables.
    pub tool_result_max_chars: usize,
}

impl LoopSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_cycles: config.max_cycles,
            tool_result_max_chars: config.tool_result_max_chars,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// How a turn ended. Reported to the operator; never written into the
/// transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model gave a final answer.
    Completed(String),
    /// The cycle budget ran out before a final answer.
    CycleLimitExceeded { cycles: u32 },
    /// The model capability failed after its retries.
    ModelFailed(String),
    /// The operator interrupted the turn.
    Cancelled,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed(_))
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed(text) => Some(text),
            _ => None,
        }
    }
}

/// The orchestrator: model call, approval, dispatch, repeat.
///
/// One instance drives one conversation. The transcript is passed in by the
/// caller for each turn so it can be persisted between turns; the loop only
/// ever appends to it.
pub struct AgentLoop {
    llm: Arc<ModelRouter>,
    dispatcher: ToolDispatcher,
    gate: ApprovalGate,
    policy: SessionPolicy,
    settings: LoopSettings,
    system_prompt: String,
    events: EventBus,
    thread_id: ThreadId,
    usage: Usage,
}

impl AgentLoop {
    pub fn new(
        llm: Arc<ModelRouter>,
        dispatcher: ToolDispatcher,
        gate: ApprovalGate,
        settings: LoopSettings,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            gate,
            policy: SessionPolicy::default(),
            settings,
            system_prompt: String::new(),
            events: EventBus::default(),
            thread_id: Uuid::new_v4(),
            usage: Usage::default(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_thread_id(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn set_thread_id(&mut self, thread_id: ThreadId) {
        self.thread_id = thread_id;
    }

    /// The policy in force now: the one this loop started with, switched to
    /// auto-approve once the operator has approved the session.
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            auto_approve: self.policy.auto_approve || self.gate.session_approved(),
        }
    }

    /// Flip session auto-approve, returning the new state. Turning it off
    /// also withdraws an earlier "approve for session" answer.
    pub fn toggle_auto_approve(&mut self) -> bool {
        let on = !self.policy().auto_approve;
        self.policy.auto_approve = on;
        if !on {
            self.gate.set_session_approved(false);
        }
        on
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &[Tool] {
        self.dispatcher.catalog()
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Tokens used by this loop across all turns.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Run one user turn to a final answer, the cycle limit, a model
    /// failure, or cancellation.
    ///
    /// Every tool call requested during the turn is resolved in `transcript`
    /// before this returns, whatever the outcome.
    pub async fn run_turn(
        &mut self,
        transcript: &mut Transcript,
        input: &str,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        // A transcript saved mid-batch (crash, kill) still has open requests.
        cancel_unresolved(transcript);

        transcript.push_user(input);
        self.events.publish(AgentEvent::TurnStarted {
            thread_id: self.thread_id,
        });
        info!(thread = %self.thread_id, "turn started");

        let mut turn_usage = Usage::default();
        let mut model_calls = 0u32;
        let mut cycle = 0u32;

        let outcome = loop {
            if cancel.is_cancelled() {
                break TurnOutcome::Cancelled;
            }
            cycle += 1;
            if cycle > self.settings.max_cycles {
                warn!(
                    thread = %self.thread_id,
                    max_cycles = self.settings.max_cycles,
                    "cycle limit reached"
                );
                break TurnOutcome::CycleLimitExceeded { cycles: cycle - 1 };
            }

            self.events.publish(AgentEvent::ModelCall { cycle });
            let request = self.build_request(transcript);
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                response = self.llm.complete(&request) => Some(response),
            };
            let Some(response) = response else {
                break TurnOutcome::Cancelled;
            };
            model_calls += 1;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(thread = %self.thread_id, cycle, error = %e, "model call failed");
                    break TurnOutcome::ModelFailed(e.to_string());
                }
            };
            turn_usage.add(response.usage);
            self.usage.add(response.usage);

            match response.output {
                ModelOutput::Final(text) => {
                    transcript.push_assistant_text(text.clone());
                    self.events.publish(AgentEvent::AssistantText { text: text.clone() });
                    break TurnOutcome::Completed(text);
                }
                ModelOutput::ToolCalls { preamble, calls } => {
                    if let Some(text) = preamble {
                        transcript.push_assistant_text(text.clone());
                        self.events.publish(AgentEvent::AssistantText { text });
                    }

                    let mut calls = assign_call_ids(calls, transcript);
                    calls.retain(|call| match transcript.push_request(call.clone()) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(call_id = %call.id, error = %e, "dropping unrecordable tool call");
                            false
                        }
                    });
                    debug!(cycle, calls = calls.len(), "executing tool batch");
                    self.execute_batch(transcript, calls, cancel).await;
                }
            }
        };

        info!(
            thread = %self.thread_id,
            cycles = model_calls,
            input_tokens = turn_usage.input_tokens,
            output_tokens = turn_usage.output_tokens,
            "turn finished"
        );
        self.events.publish(AgentEvent::TurnFinished {
            cycles: model_calls,
            usage: turn_usage,
        });
        outcome
    }

    fn build_request(&self, transcript: &Transcript) -> LlmRequest {
        LlmRequest {
            model: self.settings.model.clone(),
            system: (!self.system_prompt.is_empty()).then(|| self.system_prompt.clone()),
            turns: transcript.turns().to_vec(),
            tools: self.dispatcher.catalog().to_vec(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// Run a batch in request order. Reads run concurrently within a segment;
    /// every other call waits for everything requested before it.
    async fn execute_batch(
        &mut self,
        transcript: &mut Transcript,
        calls: Vec<ToolCall>,
        cancel: &CancellationToken,
    ) {
        for call in &calls {
            self.events.publish(AgentEvent::ToolCallStarted {
                call_id: call.id.clone(),
                tool_name: call.tool_name.clone(),
                summary: summarize(call),
            });
        }

        for segment in plan_batch(calls) {
            if cancel.is_cancelled() {
                break;
            }
            match segment.kind {
                SegmentKind::Read => {
                    let policy = self.policy();
                    let results = join_all(
                        segment
                            .calls
                            .iter()
                            .map(|call| self.run_call(call, policy, cancel)),
                    )
                    .await;
                    for (call, result) in segment.calls.iter().zip(results) {
                        self.record(transcript, call, result);
                    }
                }
                SegmentKind::Exclusive => {
                    for call in &segment.calls {
                        let result = match self.screen(call, cancel).await {
                            Ok(()) => self.run_call(call, self.policy(), cancel).await,
                            Err(refused) => refused,
                        };
                        self.record(transcript, call, result);
                    }
                }
                SegmentKind::Delegate => {
                    // Prompts one at a time, in order; approved children
                    // then run side by side under the sub-agent ceiling.
                    let mut results: Vec<Option<ToolResult>> = vec![None; segment.calls.len()];
                    let mut approved = Vec::new();
                    for (i, call) in segment.calls.iter().enumerate() {
                        match self.screen(call, cancel).await {
                            Ok(()) => approved.push(i),
                            Err(refused) => results[i] = Some(refused),
                        }
                    }
                    let policy = self.policy();
                    let ran = join_all(
                        approved
                            .iter()
                            .map(|&i| self.run_call(&segment.calls[i], policy, cancel)),
                    )
                    .await;
                    for (i, result) in approved.into_iter().zip(ran) {
                        results[i] = Some(result);
                    }
                    for (call, result) in segment.calls.iter().zip(results) {
                        if let Some(result) = result {
                            self.record(transcript, call, result);
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            cancel_unresolved(transcript);
        }
    }

    /// Validation and approval for a sensitive call. `Err` carries the
    /// result to record instead of running it.
    async fn screen(
        &mut self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<(), ToolResult> {
        // Unknown tools and bad arguments are refused before anyone is asked.
        if let Err(e) = self.dispatcher.validate(call) {
            return Err(ToolResult::failure(&call.id, &e));
        }

        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            decision = self.gate.check(call, self.policy) => Some(decision),
        };
        if let Some(d) = decision {
            self.events.publish(AgentEvent::ApprovalDecided {
                call_id: call.id.clone(),
                tool_name: call.tool_name.clone(),
                approved: d.is_approved(),
            });
        }
        match decision {
            None => Err(ToolResult::failure(&call.id, &ToolError::canceled())),
            Some(d) if d.is_approved() => Ok(()),
            Some(_) => {
                info!(tool = %call.tool_name, call_id = %call.id, "tool call declined");
                Err(ToolResult::failure(
                    &call.id,
                    &ToolError::declined(&call.tool_name),
                ))
            }
        }
    }

    /// Dispatch an already-approved call and shape its result.
    async fn run_call(
        &self,
        call: &ToolCall,
        policy: SessionPolicy,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let invocation = self.dispatcher.invoke(call, policy, cancel);
        let outcome = if NON_CANCELLABLE.contains(&call.tool_name.as_str()) {
            invocation.await
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ToolError::canceled()),
                outcome = invocation => outcome,
            }
        };

        let mut result = ToolResult::from_outcome(&call.id, outcome);
        result.content = truncate_tool_result(&result.content, self.settings.tool_result_max_chars);
        result
    }

    fn record(&self, transcript: &mut Transcript, call: &ToolCall, result: ToolResult) {
        if result.is_error {
            debug!(tool = %call.tool_name, call_id = %call.id, kind = ?result.error_kind, "tool call failed");
        }
        self.events.publish(AgentEvent::ToolCallFinished {
            call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            error: result.error_kind,
        });
        if let Err(e) = transcript.push_result(result) {
            warn!(call_id = %call.id, error = %e, "could not record tool result");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    /// Consecutive read-only calls, run concurrently.
    Read,
    /// Consecutive delegations: approved in order, run concurrently.
    Delegate,
    /// One sensitive call on its own.
    Exclusive,
}

impl SegmentKind {
    fn of(call: &ToolCall) -> Self {
        match call.sensitivity() {
            Sensitivity::ReadOnly => SegmentKind::Read,
            Sensitivity::Sensitive if call.tool_name == TASK_TOOL => SegmentKind::Delegate,
            Sensitivity::Sensitive => SegmentKind::Exclusive,
        }
    }
}

#[derive(Debug)]
struct Segment {
    kind: SegmentKind,
    calls: Vec<ToolCall>,
}

/// Split a batch into order-preserving segments.
fn plan_batch(calls: Vec<ToolCall>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for call in calls {
        let kind = SegmentKind::of(&call);
        match segments.last_mut() {
            Some(last) if last.kind == kind && kind != SegmentKind::Exclusive => {
                last.calls.push(call)
            }
            _ => segments.push(Segment {
                kind,
                calls: vec![call],
            }),
        }
    }
    segments
}

/// Give every call an id unique within the transcript.
fn assign_call_ids(calls: Vec<ToolCall>, transcript: &Transcript) -> Vec<ToolCall> {
    let mut seen = std::collections::HashSet::new();
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() || transcript.contains_call_id(&call.id) || !seen.insert(call.id.clone()) {
                let fresh = format!("call_{}", Uuid::new_v4().simple());
                debug!(original = %call.id, assigned = %fresh, "reassigned tool call id");
                call.id = fresh;
                seen.insert(call.id.clone());
            }
            call
        })
        .collect()
}

/// Resolve every open request as canceled.
fn cancel_unresolved(transcript: &mut Transcript) {
    for id in transcript.unresolved().to_vec() {
        if let Err(e) = transcript.push_result(ToolResult::failure(&id, &ToolError::canceled())) {
            warn!(call_id = %id, error = %e, "could not resolve open tool call");
        }
    }
}

/// One-line description of a call for progress display.
fn summarize(call: &ToolCall) -> String {
    const KEYS: &[&str] = &["file_path", "path", "pattern", "command", "url", "description"];
    match KEYS.iter().find_map(|k| call.str_arg(k)) {
        Some(detail) => {
            let detail = detail.lines().next().unwrap_or_default();
            let short: String = detail.chars().take(80).collect();
            let ellipsis = if detail.chars().count() > 80 { "…" } else { "" };
            format!("{}({short}{ellipsis})", call.tool_name)
        }
        None => call.tool_name.clone(),
    }
}

/// Keep the first 60% and last 20% of the allowed characters and replace the
/// middle with a note.
fn truncate_tool_result(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if max_chars == 0 || total <= max_chars {
        return content.to_string();
    }

    let head_chars = (max_chars * 6) / 10;
    let tail_chars = (max_chars * 2) / 10;
    let head: String = content.chars().take(head_chars).collect();
    let tail: String = content.chars().skip(total - tail_chars).collect();
    let omitted = total - head_chars - tail_chars;

    format!("{head}\n\n[... truncated {omitted} chars to fit context window ...]\n\n{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, json!({}))
    }

    #[test]
    fn batch_segments_preserve_order() {
        let segments = plan_batch(vec![
            call("1", "read_file"),
            call("2", "grep"),
            call("3", "write_file"),
            call("4", "shell"),
            call("5", "task"),
            call("6", "task"),
            call("7", "ls"),
        ]);
        let shape: Vec<(SegmentKind, Vec<&str>)> = segments
            .iter()
            .map(|s| (s.kind, s.calls.iter().map(|c| c.id.as_str()).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (SegmentKind::Read, vec!["1", "2"]),
                (SegmentKind::Exclusive, vec!["3"]),
                (SegmentKind::Exclusive, vec!["4"]),
                (SegmentKind::Delegate, vec!["5", "6"]),
                (SegmentKind::Read, vec!["7"]),
            ]
        );
    }

    #[test]
    fn duplicate_and_empty_ids_are_replaced() {
        let mut transcript = Transcript::new();
        transcript.push_request(call("used", "ls")).unwrap();
        let calls = assign_call_ids(
            vec![call("used", "ls"), call("", "ls"), call("a", "ls"), call("a", "ls")],
            &transcript,
        );
        let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_ne!(ids[0], "used");
        assert!(!ids[1].is_empty());
        assert_eq!(ids[2], "a");
        assert_ne!(ids[3], "a");
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn truncation_keeps_head_and_tail() {
        let content = format!("{}{}{}", "H".repeat(100), "M".repeat(800), "T".repeat(100));
        let out = truncate_tool_result(&content, 100);
        assert!(out.starts_with(&"H".repeat(60)));
        assert!(out.ends_with(&"T".repeat(20)));
        assert!(out.contains("truncated 920 chars"));
        assert_eq!(truncate_tool_result("short", 100), "short");
        assert_eq!(truncate_tool_result(&content, 0), content);
    }

    #[test]
    fn summary_uses_the_salient_argument() {
        let c = ToolCall::new("1", "shell", json!({"command": "cargo test\nmore"}));
        assert_eq!(summarize(&c), "shell(cargo test)");
        assert_eq!(summarize(&call("2", "write_todos")), "write_todos");
    }
}
