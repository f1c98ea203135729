#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use swe_approval::{ApprovalDecision, ApprovalGate, SessionPolicy};
    use swe_core::ToolCall;

    fn call(tool: &str) -> ToolCall {
        ToolCall::new(format!("call_{tool}"), tool, json!({"command": "echo hi"}))
    }

    // ── Read-only calls ────────────────────────────────────────

    #[tokio::test]
    async fn test_read_only_never_prompts() {
        let (gate, _rx) = ApprovalGate::channel(None);
        let policy = SessionPolicy::default();
        for tool in ["ls", "read_file", "glob", "grep", "write_todos"] {
            assert_eq!(gate.check(&call(tool), policy).await, ApprovalDecision::Approved);
        }
        assert_eq!(gate.prompts_raised(), 0);
    }

    // ── Auto-approve ───────────────────────────────────────────

    #[tokio::test]
    async fn test_auto_approve_never_prompts() {
        let (gate, mut rx) = ApprovalGate::channel(None);
        let policy = SessionPolicy::auto_approve();
        for tool in ["write_file", "edit_file", "shell", "fetch_url", "task", "mystery"] {
            assert!(gate.check(&call(tool), policy).await.is_approved());
        }
        assert_eq!(gate.prompts_raised(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_toggle_auto_approve() {
        let mut policy = SessionPolicy::default();
        assert!(policy.toggle_auto_approve());
        assert!(!policy.toggle_auto_approve());
    }

    // ── Operator answers ───────────────────────────────────────

    #[tokio::test]
    async fn test_approved_flow() {
        let (gate, mut rx) = ApprovalGate::channel(None);
        let handle = tokio::spawn(async move {
            let policy = SessionPolicy::default();
            gate.check(&call("shell"), policy).await
        });

        let (req, responder) = rx.recv().await.unwrap();
        assert_eq!(req.tool_name, "shell");
        assert_eq!(req.call_id, "call_shell");
        assert_eq!(req.preview.get("Shell Command"), Some("echo hi"));
        responder.send(ApprovalDecision::Approved).unwrap();

        assert_eq!(handle.await.unwrap(), ApprovalDecision::Approved);
    }

    #[tokio::test]
    async fn test_rejected_flow() {
        let (gate, mut rx) = ApprovalGate::channel(None);
        let handle = tokio::spawn(async move {
            let policy = SessionPolicy::default();
            gate.check(&call("write_file"), policy).await
        });
        let (_req, responder) = rx.recv().await.unwrap();
        responder.send(ApprovalDecision::Rejected).unwrap();
        assert_eq!(handle.await.unwrap(), ApprovalDecision::Rejected);
    }

    #[tokio::test]
    async fn test_approve_for_session_covers_every_clone() {
        let (gate, mut rx) = ApprovalGate::channel(None);
        tokio::spawn(async move {
            if let Some((_req, responder)) = rx.recv().await {
                let _ = responder.send(ApprovalDecision::ApprovedForSession);
            }
        });

        let child_gate = gate.clone();
        let policy = SessionPolicy::default();
        let first = child_gate.check(&call("shell"), policy).await;
        assert_eq!(first, ApprovalDecision::ApprovedForSession);
        assert!(gate.session_approved());
        // The policy value itself is a snapshot and stays as it was.
        assert!(!policy.auto_approve);

        // No operator is answering any more; neither gate may ask again.
        assert!(gate.check(&call("shell"), policy).await.is_approved());
        assert!(child_gate.check(&call("write_file"), policy).await.is_approved());
        assert_eq!(gate.prompts_raised(), 1);
    }

    #[tokio::test]
    async fn test_clearing_session_approval_prompts_again() {
        let (gate, _rx) = ApprovalGate::channel(Some(Duration::from_millis(20)));
        gate.set_session_approved(true);
        assert!(gate.check(&call("shell"), SessionPolicy::default()).await.is_approved());
        gate.set_session_approved(false);
        assert_eq!(
            gate.check(&call("shell"), SessionPolicy::default()).await,
            ApprovalDecision::Rejected
        );
        assert_eq!(gate.prompts_raised(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_rejection() {
        let (gate, _rx) = ApprovalGate::channel(Some(Duration::from_millis(20)));
        let policy = SessionPolicy::default();
        assert_eq!(gate.check(&call("shell"), policy).await, ApprovalDecision::Rejected);
    }

    #[tokio::test]
    async fn test_no_operator_rejects() {
        let (gate, rx) = ApprovalGate::channel(None);
        drop(rx);
        let policy = SessionPolicy::default();
        assert_eq!(gate.check(&call("shell"), policy).await, ApprovalDecision::Rejected);
    }

    #[tokio::test]
    async fn test_dropped_responder_rejects() {
        let (gate, mut rx) = ApprovalGate::channel(None);
        tokio::spawn(async move {
            let pending = rx.recv().await;
            drop(pending);
        });
        let policy = SessionPolicy::default();
        assert_eq!(gate.check(&call("task"), policy).await, ApprovalDecision::Rejected);
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(ApprovalGate::timeout_from_secs(0), None);
        assert_eq!(ApprovalGate::timeout_from_secs(5), Some(Duration::from_secs(5)));
    }
}
