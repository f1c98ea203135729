#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    use swe_approval::{ApprovalDecision, ApprovalGate, ApprovalReceiver, SessionPolicy};
    use swe_config::{ProjectLayout, SweConfig};
    use swe_core::{
        AgentEvent, EventBus, SweError, Tool, ToolCall, ToolError, ToolErrorKind, ToolExecutor,
        ToolOutput, ToolResult, Transcript, Turn,
    };
    use swe_llm::{MockProvider, MockResponse, ModelRouter};
    use swe_runtime::{
        AgentLoop, LoopSettings, SessionBuilder, SubAgentFactory, SubAgentSettings, ThreadRecord,
        ThreadStore, ToolDispatcher, TurnOutcome, build_router,
    };

    /// Executor that records the order in which tools start and finish.
    #[derive(Default)]
    struct RecordingTools {
        log: Mutex<Vec<String>>,
    }

    impl RecordingTools {
        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }

        fn ran(&self, tool: &str) -> bool {
            self.log().iter().any(|e| e == &format!("start {tool}"))
        }
    }

    #[async_trait]
    impl ToolExecutor for RecordingTools {
        fn tools(&self) -> Vec<Tool> {
            let path_only = json!({
                "type": "object",
                "properties": { "path": { "type": "string" } }
            });
            vec![
                Tool::new("ls", "list", path_only.clone()),
                Tool::new("read_file", "read", path_only),
                Tool::new(
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
                ),
                Tool::new(
                    "shell",
                    "run",
                    json!({
                        "type": "object",
                        "properties": { "command": { "type": "string" } },
                        "required": ["command"]
                    }),
                ),
            ]
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
            self.log.lock().push(format!("start {}", call.tool_name));
            if call.tool_name == "ls" {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if call.str_arg("command") == Some("slow") {
                tokio::time::sleep(Duration::from_millis(60)).await;
            }
            self.log.lock().push(format!("end {}", call.tool_name));
            Ok(ToolOutput::text(format!("{} ok", call.tool_name)))
        }
    }

    fn router(provider: &Arc<MockProvider>) -> Arc<ModelRouter> {
        Arc::new(
            ModelRouter::new()
                .with_provider(provider.clone())
                .with_max_retries(0),
        )
    }

    fn settings(max_cycles: u32) -> LoopSettings {
        LoopSettings {
            model: "test-model".into(),
            max_cycles,
            ..LoopSettings::default()
        }
    }

    fn agent(
        provider: &Arc<MockProvider>,
        tools: &Arc<RecordingTools>,
        max_cycles: u32,
    ) -> (AgentLoop, ApprovalGate, ApprovalReceiver) {
        let (gate, rx) = ApprovalGate::channel(None);
        let dispatcher = ToolDispatcher::new(tools.clone(), &[]);
        let agent = AgentLoop::new(router(provider), dispatcher, gate.clone(), settings(max_cycles));
        (agent, gate, rx)
    }

    /// Answers approval prompts from a script, then rejects. Returns the
    /// tool names it was asked about once the gate is dropped.
    fn operator(mut rx: ApprovalReceiver, answers: Vec<ApprovalDecision>) -> JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let mut answers = answers.into_iter();
            let mut asked = Vec::new();
            while let Some((request, respond)) = rx.recv().await {
                asked.push(request.tool_name.clone());
                let _ = respond.send(answers.next().unwrap_or(ApprovalDecision::Rejected));
            }
            asked
        })
    }

    fn results(transcript: &Transcript) -> Vec<&ToolResult> {
        transcript
            .turns()
            .iter()
            .filter_map(|t| match t {
                Turn::ToolCallResult { result } => Some(result),
                _ => None,
            })
            .collect()
    }

    // ── Agent loop ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let provider = Arc::new(MockProvider::new("mock").with_response("all done"));
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, _gate, _rx) = agent(&provider, &tools, 10);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "hello", &CancellationToken::new())
            .await;

        assert_eq!(outcome, TurnOutcome::Completed("all done".into()));
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last_assistant_text(), Some("all done"));
        assert_eq!(agent.usage().total(), 150);
    }

    #[tokio::test]
    async fn test_cycle_limit_keeps_transcript_consistent() {
        let provider = Arc::new(MockProvider::new("mock").repeating(MockResponse::tool_calls(vec![
            ToolCall::new("", "ls", json!({"path": "."})),
        ])));
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, _gate, _rx) = agent(&provider, &tools, 3);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "loop forever", &CancellationToken::new())
            .await;

        assert_eq!(outcome, TurnOutcome::CycleLimitExceeded { cycles: 3 });
        assert_eq!(provider.recorded_requests().len(), 3);
        // user + 3 × (request, result)
        assert_eq!(transcript.len(), 7);
        assert!(transcript.unresolved().is_empty());
        assert!(results(&transcript).iter().all(|r| !r.is_error));
    }

    #[tokio::test]
    async fn test_auto_approve_raises_no_prompts() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_call("write_file", json!({"file_path": "/tmp/a", "content": "x"}))
                .with_response("written"),
        );
        let tools = Arc::new(RecordingTools::default());
        let (agent, gate, rx) = agent(&provider, &tools, 10);
        let mut agent = agent.with_policy(SessionPolicy::auto_approve());
        let asked = operator(rx, vec![]);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "write it", &CancellationToken::new())
            .await;

        assert!(outcome.is_completed());
        assert!(tools.ran("write_file"));
        assert_eq!(gate.prompts_raised(), 0);
        drop(agent);
        drop(gate);
        assert!(asked.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_recorded_and_turn_continues() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_call("shell", json!({"command": "rm -rf build"}))
                .with_response("understood, leaving build alone"),
        );
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, gate, rx) = agent(&provider, &tools, 10);
        let asked = operator(rx, vec![ApprovalDecision::Rejected]);
        let mut events = agent.events().subscribe();

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "clean up", &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Completed("understood, leaving build alone".into())
        );
        assert!(!tools.ran("shell"));
        let recorded = results(&transcript);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].error_kind, Some(ToolErrorKind::Declined));

        let mut decided = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let AgentEvent::ApprovalDecided { tool_name, approved, .. } = event {
                decided.push((tool_name, approved));
            }
        }
        assert_eq!(decided, vec![("shell".to_string(), false)]);

        // The second model call sees the rejection.
        let requests = provider.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].turns.iter().any(|t| matches!(
            t,
            Turn::ToolCallResult { result } if result.error_kind == Some(ToolErrorKind::Declined)
        )));

        drop(agent);
        drop(gate);
        assert_eq!(asked.await.unwrap(), vec!["shell".to_string()]);
    }

    #[tokio::test]
    async fn test_approve_for_session_stops_further_prompts() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_call("shell", json!({"command": "make"}))
                .with_tool_call("shell", json!({"command": "make test"}))
                .with_response("built and tested"),
        );
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, gate, rx) = agent(&provider, &tools, 10);
        let asked = operator(rx, vec![ApprovalDecision::ApprovedForSession]);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "build", &CancellationToken::new())
            .await;

        assert!(outcome.is_completed());
        assert!(agent.policy().auto_approve);
        assert_eq!(gate.prompts_raised(), 1);
        assert_eq!(results(&transcript).iter().filter(|r| !r.is_error).count(), 2);
        drop(agent);
        drop(gate);
        assert_eq!(asked.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reads_before_write_complete_first() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_calls(vec![
                    ("ls", json!({"path": "."})),
                    ("write_file", json!({"file_path": "/tmp/a", "content": "x"})),
                    ("read_file", json!({"path": "/tmp/a"})),
                ])
                .with_response("done"),
        );
        let tools = Arc::new(RecordingTools::default());
        let (agent, _gate, _rx) = agent(&provider, &tools, 10);
        let mut agent = agent.with_policy(SessionPolicy::auto_approve());

        let mut transcript = Transcript::new();
        agent
            .run_turn(&mut transcript, "go", &CancellationToken::new())
            .await;

        assert_eq!(
            tools.log(),
            vec![
                "start ls",
                "end ls",
                "start write_file",
                "end write_file",
                "start read_file",
                "end read_file",
            ]
        );
        // Results land in request order.
        let contents: Vec<&str> = results(&transcript).iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["ls ok", "write_file ok", "read_file ok"]);
    }

    #[tokio::test]
    async fn test_invalid_calls_never_prompt() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_calls(vec![
                    ("format_disk", json!({})),
                    ("write_file", json!({"file_path": 7})),
                ])
                .with_response("sorry"),
        );
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, gate, _rx) = agent(&provider, &tools, 10);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "go", &CancellationToken::new())
            .await;

        assert!(outcome.is_completed());
        assert_eq!(gate.prompts_raised(), 0);
        let kinds: Vec<_> = results(&transcript).iter().map(|r| r.error_kind).collect();
        assert_eq!(
            kinds,
            vec![Some(ToolErrorKind::NotFound), Some(ToolErrorKind::Validation)]
        );
        assert!(tools.log().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_ends_turn() {
        let provider = Arc::new(MockProvider::new("mock").with_error("invalid x-api-key"));
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, _gate, _rx) = agent(&provider, &tools, 10);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "hi", &CancellationToken::new())
            .await;

        match outcome {
            TurnOutcome::ModelFailed(reason) => assert!(reason.contains("invalid x-api-key")),
            other => panic!("expected model failure, got {other:?}"),
        }
        // Only the user input was recorded.
        assert_eq!(transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_approval() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_calls(vec![
                    ("shell", json!({"command": "deploy"})),
                    ("ls", json!({"path": "."})),
                ])
                .with_response("never reached"),
        );
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, _gate, mut rx) = agent(&provider, &tools, 10);

        let cancel = CancellationToken::new();
        let interrupter = cancel.clone();
        let operator = async move {
            // Hold the prompt open and interrupt instead of answering.
            let pending = rx.recv().await;
            interrupter.cancel();
            pending
        };

        let mut transcript = Transcript::new();
        let (outcome, pending) = tokio::join!(agent.run_turn(&mut transcript, "ship it", &cancel), operator);

        assert!(pending.is_some());
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(tools.log().is_empty());
        assert!(transcript.unresolved().is_empty());
        let recorded = results(&transcript);
        assert_eq!(recorded.len(), 2);
        assert!(recorded.iter().all(|r| r.error_kind == Some(ToolErrorKind::Canceled)));
        assert_eq!(provider.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_running_shell_finishes_after_interrupt() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_calls(vec![
                    ("shell", json!({"command": "slow"})),
                    ("write_file", json!({"file_path": "out.txt", "content": "x"})),
                ])
                .with_response("never reached"),
        );
        let tools = Arc::new(RecordingTools::default());
        let (agent, _gate, _rx) = agent(&provider, &tools, 10);
        let mut agent = agent.with_policy(SessionPolicy::auto_approve());

        let cancel = CancellationToken::new();
        let interrupter = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            interrupter.cancel();
        });

        let mut transcript = Transcript::new();
        let outcome = agent.run_turn(&mut transcript, "build it", &cancel).await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
        // The shell command already running completed; the write never started.
        assert_eq!(tools.log(), vec!["start shell", "end shell"]);
        let recorded = results(&transcript);
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].error_kind, None);
        assert_eq!(recorded[0].content, "shell ok");
        assert_eq!(recorded[1].error_kind, Some(ToolErrorKind::Canceled));
        assert!(transcript.unresolved().is_empty());
        // No further cycle after the interrupt.
        assert_eq!(provider.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_next_turn_after_cancel_starts_clean() {
        let provider = Arc::new(MockProvider::new("mock").with_response("fresh start"));
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, _gate, _rx) = agent(&provider, &tools, 10);

        // A transcript left with an open request, as after a crash.
        let mut transcript = Transcript::new();
        transcript.push_user("earlier");
        transcript
            .push_request(ToolCall::new("c1", "ls", json!({"path": "."})))
            .unwrap();

        let outcome = agent
            .run_turn(&mut transcript, "again", &CancellationToken::new())
            .await;
        assert!(outcome.is_completed());
        assert!(transcript.unresolved().is_empty());
        assert_eq!(results(&transcript)[0].error_kind, Some(ToolErrorKind::Canceled));
    }

    // ── Sub-agents ─────────────────────────────────────────────

    fn supervised_delegating_agent(
        provider: &Arc<MockProvider>,
        tools: &Arc<RecordingTools>,
        sub: SubAgentSettings,
        events: &EventBus,
    ) -> (AgentLoop, ApprovalGate, ApprovalReceiver) {
        let (gate, rx) = ApprovalGate::channel(None);
        let llm = router(provider);
        let factory = SubAgentFactory::new(llm.clone(), tools.clone(), gate.clone(), settings(10), sub)
            .with_events(events.clone());
        let dispatcher = ToolDispatcher::new(tools.clone(), &[]).with_delegation(factory);
        let agent = AgentLoop::new(llm, dispatcher, gate.clone(), settings(10))
            .with_events(events.clone());
        (agent, gate, rx)
    }

    fn delegating_agent(
        provider: &Arc<MockProvider>,
        tools: &Arc<RecordingTools>,
        sub: SubAgentSettings,
        events: &EventBus,
    ) -> AgentLoop {
        let (agent, _gate, _rx) = supervised_delegating_agent(provider, tools, sub, events);
        agent.with_policy(SessionPolicy::auto_approve())
    }

    #[tokio::test]
    async fn test_subagent_sees_only_its_instructions() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_call("task", json!({"description": "count the rust files"}))
                .with_response("there are 12 rust files")
                .with_response("The project has 12 Rust files."),
        );
        let tools = Arc::new(RecordingTools::default());
        let events = EventBus::default();
        let mut agent = delegating_agent(&provider, &tools, SubAgentSettings::default(), &events);

        let mut transcript = Transcript::new();
        transcript.push_user("earlier secret context");
        transcript.push_assistant_text("noted");
        let outcome = agent
            .run_turn(&mut transcript, "how many rust files?", &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Completed("The project has 12 Rust files.".into())
        );

        let requests = provider.recorded_requests();
        assert_eq!(requests.len(), 3);
        let child = &requests[1];
        assert_eq!(child.turns, vec![Turn::user("count the rust files")]);
        assert!(child.system.as_deref().unwrap_or_default().contains("sub-agent"));
        // max_depth 1: the child cannot delegate again.
        assert!(child.tools.iter().all(|t| t.name != "task"));

        let recorded = results(&transcript);
        assert_eq!(recorded[0].content, "there are 12 rust files");
    }

    #[tokio::test]
    async fn test_subagent_concurrency_ceiling() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_calls(vec![
                    ("task", json!({"description": "first"})),
                    ("task", json!({"description": "second"})),
                ])
                .with_mock_response(MockResponse::text("one").delayed(Duration::from_millis(30)))
                .with_mock_response(MockResponse::text("two").delayed(Duration::from_millis(30)))
                .with_response("both done"),
        );
        let tools = Arc::new(RecordingTools::default());
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let sub = SubAgentSettings {
            max_concurrent: 1,
            ..SubAgentSettings::default()
        };
        let mut agent = delegating_agent(&provider, &tools, sub, &events);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "split the work", &CancellationToken::new())
            .await;
        assert!(outcome.is_completed());

        let mut running = 0i32;
        let mut peak = 0i32;
        while let Ok(event) = rx.try_recv() {
            match event {
                AgentEvent::SubAgentStarted { .. } => {
                    running += 1;
                    peak = peak.max(running);
                }
                AgentEvent::SubAgentFinished { success, .. } => {
                    assert!(success);
                    running -= 1;
                }
                _ => {}
            }
        }
        assert_eq!(peak, 1);
        assert_eq!(running, 0);
        assert_eq!(results(&transcript).len(), 2);
    }

    #[tokio::test]
    async fn test_subagent_failure_is_a_tool_error() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_call("task", json!({"description": "do it"}))
                .with_error("invalid x-api-key")
                .with_response("the helper failed"),
        );
        let tools = Arc::new(RecordingTools::default());
        let events = EventBus::default();
        let mut agent = delegating_agent(&provider, &tools, SubAgentSettings::default(), &events);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "delegate", &CancellationToken::new())
            .await;

        assert!(outcome.is_completed());
        assert_eq!(
            results(&transcript)[0].error_kind,
            Some(ToolErrorKind::SubAgentFailed)
        );
    }

    #[tokio::test]
    async fn test_subagent_timeout_is_a_tool_error() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_call("task", json!({"description": "take forever"}))
                .with_mock_response(MockResponse::text("too late").delayed(Duration::from_millis(300)))
                .with_response("the helper timed out"),
        );
        let tools = Arc::new(RecordingTools::default());
        let events = EventBus::default();
        let sub = SubAgentSettings {
            timeout: Some(Duration::from_millis(20)),
            ..SubAgentSettings::default()
        };
        let mut agent = delegating_agent(&provider, &tools, sub, &events);

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "delegate", &CancellationToken::new())
            .await;

        assert_eq!(outcome, TurnOutcome::Completed("the helper timed out".into()));
        let recorded = results(&transcript);
        assert_eq!(recorded[0].error_kind, Some(ToolErrorKind::SubAgentFailed));
        assert!(recorded[0].content.contains("timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_subagent_session_approval_reaches_parent() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_tool_call("task", json!({"description": "write the notes"}))
                .with_tool_call("write_file", json!({"file_path": "notes.md", "content": "x"}))
                .with_response("notes written")
                .with_tool_call("shell", json!({"command": "cargo fmt"}))
                .with_response("all done"),
        );
        let tools = Arc::new(RecordingTools::default());
        let events = EventBus::default();
        let (mut agent, gate, rx) =
            supervised_delegating_agent(&provider, &tools, SubAgentSettings::default(), &events);
        // Parent approves the delegation; the child's prompt is answered
        // "approve for session"; anything further would be rejected.
        let asked = operator(
            rx,
            vec![ApprovalDecision::Approved, ApprovalDecision::ApprovedForSession],
        );

        let mut transcript = Transcript::new();
        let outcome = agent
            .run_turn(&mut transcript, "notes then format", &CancellationToken::new())
            .await;

        assert_eq!(outcome, TurnOutcome::Completed("all done".into()));
        assert!(tools.ran("write_file"));
        assert!(tools.ran("shell"));
        assert_eq!(gate.prompts_raised(), 2);
        assert!(agent.policy().auto_approve);

        drop(agent);
        drop(gate);
        assert_eq!(
            asked.await.unwrap(),
            vec!["task".to_string(), "write_file".to_string()]
        );
    }

    #[tokio::test]
    async fn test_auto_approve_off_withdraws_session_approval() {
        let provider = Arc::new(MockProvider::new("mock"));
        let tools = Arc::new(RecordingTools::default());
        let (mut agent, gate, _rx) = agent(&provider, &tools, 10);

        gate.set_session_approved(true);
        assert!(agent.policy().auto_approve);
        assert!(!agent.toggle_auto_approve());
        assert!(!gate.session_approved());
        assert!(!agent.policy().auto_approve);
        assert!(agent.toggle_auto_approve());
    }

    // ── Session assembly ───────────────────────────────────────

    #[tokio::test]
    async fn test_session_prompt_includes_memory_and_environment() {
        let home = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(home.path(), "agent", cwd.path()).unwrap();
        std::fs::create_dir_all(layout.agent_dir()).unwrap();
        std::fs::write(layout.global_agents_md(), "Prefer tabs over spaces.").unwrap();

        let provider = Arc::new(MockProvider::new("mock"));
        let session = SessionBuilder::new(SweConfig::default(), layout, cwd.path())
            .with_router(router(&provider))
            .auto_approve(true)
            .build()
            .unwrap();

        let prompt = session.agent.system_prompt();
        assert!(prompt.contains("## Environment"));
        assert!(prompt.contains(&cwd.path().display().to_string()));
        assert!(prompt.contains("Prefer tabs over spaces."));
        assert!(prompt.find("## Environment") < prompt.find("<agent_memory>"));
        assert!(session.agent.policy().auto_approve);
        assert!(session.agent.tools().iter().any(|t| t.name == "task"));
        assert!(session.agent.tools().iter().any(|t| t.name == "write_todos"));
    }

    #[tokio::test]
    async fn test_session_offers_web_search_with_a_key() {
        let home = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let offers_search = |config: SweConfig| {
            let layout = ProjectLayout::new(home.path(), "agent", cwd.path()).unwrap();
            let provider = Arc::new(MockProvider::new("mock"));
            let session = SessionBuilder::new(config, layout, cwd.path())
                .with_router(router(&provider))
                .build()
                .unwrap();
            session.agent.tools().iter().any(|t| t.name == "web_search")
        };

        assert!(!offers_search(SweConfig::default()));
        let mut config = SweConfig::default();
        config.services.tavily_api_key = Some("tvly-test".into());
        assert!(offers_search(config));
    }

    #[tokio::test]
    async fn test_session_respects_enabled_tools_and_depth() {
        let home = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(home.path(), "agent", cwd.path()).unwrap();

        let mut config = SweConfig::default();
        config.tools.enabled = vec!["ls".into(), "read_file".into()];
        config.subagents.max_depth = 0;

        let provider = Arc::new(MockProvider::new("mock"));
        let session = SessionBuilder::new(config, layout, cwd.path())
            .with_router(router(&provider))
            .build()
            .unwrap();

        let mut names: Vec<String> = session.agent.tools().iter().map(|t| t.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["ls", "read_file"]);
    }

    #[test]
    fn test_router_requires_a_provider() {
        let config = SweConfig::default();
        let err = build_router(&config, &EventBus::default()).unwrap_err();
        assert!(matches!(err, SweError::Config(_)));
    }

    #[test]
    fn test_missing_prompt_file_is_a_config_error() {
        let home = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(home.path(), "agent", cwd.path()).unwrap();
        let mut config = SweConfig::default();
        config.agent.system_prompt_file = Some(home.path().join("missing.md"));

        let provider = Arc::new(MockProvider::new("mock"));
        let result = SessionBuilder::new(config, layout, cwd.path())
            .with_router(router(&provider))
            .build();
        assert!(matches!(result, Err(SweError::Config(_))));
    }

    // ── Thread store ───────────────────────────────────────────

    #[test]
    fn test_thread_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(dir.path());

        let mut first = ThreadRecord::new("agent");
        let mut transcript = Transcript::new();
        transcript.push_user("rename the config module");
        transcript.push_assistant_text("done");
        first.update(&transcript);
        store.save(&first).unwrap();

        let mut second = ThreadRecord::new("agent");
        second.update(&Transcript::new());
        store.save(&second).unwrap();

        let mut other = ThreadRecord::new("reviewer");
        other.update(&Transcript::new());
        store.save(&other).unwrap();

        let loaded = store.load(first.id).unwrap();
        assert_eq!(loaded.transcript, transcript);
        assert_eq!(loaded.title.as_deref(), Some("rename the config module"));

        let listed = store.list(Some("agent"), 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(store.list(None, 1).unwrap().len(), 1);

        let latest = store.latest("reviewer").unwrap().unwrap();
        assert_eq!(latest.id, other.id);

        let prefix = &first.id.to_string()[..8];
        assert_eq!(store.find(prefix).unwrap().id, first.id);
    }

    #[test]
    fn test_thread_delete_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(dir.path().join("threads"));
        assert!(store.list(None, 10).unwrap().is_empty());
        assert!(store.latest("agent").unwrap().is_none());

        let record = ThreadRecord::new("agent");
        store.save(&record).unwrap();
        store.delete(record.id).unwrap();

        assert!(matches!(store.load(record.id), Err(SweError::ThreadNotFound(_))));
        assert!(matches!(store.delete(record.id), Err(SweError::ThreadNotFound(_))));
    }
}
