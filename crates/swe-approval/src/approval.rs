use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use swe_core::ToolCall;

use crate::preview::{ActionPreview, preview_call};

/// Outcome of an approval check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    /// Approved, and every later sensitive call in the session is too.
    ApprovedForSession,
}

impl ApprovalDecision {
    pub fn is_approved(self) -> bool {
        !matches!(self, ApprovalDecision::Rejected)
    }
}

/// Approval policy a loop was started with. Passed explicitly to every
/// check; a sub-agent receives a copy taken when it is spawned and keeps it.
/// An operator's "approve for session" answer is recorded on the gate, not
/// here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    pub auto_approve: bool,
}

impl SessionPolicy {
    pub fn auto_approve() -> Self {
        Self { auto_approve: true }
    }

    /// Flip auto-approve, returning the new state.
    pub fn toggle_auto_approve(&mut self) -> bool {
        self.auto_approve = !self.auto_approve;
        self.auto_approve
    }
}

/// A request for the operator to approve one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub preview: ActionPreview,
    pub created_at: DateTime<Utc>,
}

/// A request paired with the channel the operator answers on.
pub type PendingApproval = (ApprovalRequest, oneshot::Sender<ApprovalDecision>);

/// The operator side of the gate.
pub type ApprovalReceiver = mpsc::Receiver<PendingApproval>;

/// Routes sensitive calls to the operator. Cheap to clone; sub-agents share
/// their parent's gate and therefore the same operator and the same
/// session-wide approval.
#[derive(Clone)]
pub struct ApprovalGate {
    request_tx: mpsc::Sender<PendingApproval>,
    /// None waits indefinitely.
    timeout: Option<Duration>,
    prompts: Arc<AtomicUsize>,
    /// Set by an "approve for session" answer from any loop on this gate.
    session_approved: Arc<AtomicBool>,
}

impl ApprovalGate {
    /// Create a gate and the receiver the operator interface listens on.
    pub fn channel(timeout: Option<Duration>) -> (Self, ApprovalReceiver) {
        let (tx, rx) = mpsc::channel(64);
        let gate = Self {
            request_tx: tx,
            timeout,
            prompts: Arc::new(AtomicUsize::new(0)),
            session_approved: Arc::new(AtomicBool::new(false)),
        };
        (gate, rx)
    }

    /// From `approval.timeout_secs`, where 0 means no limit.
    pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// How many times an operator has been asked, across all clones.
    pub fn prompts_raised(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Whether the operator has approved everything for this session.
    pub fn session_approved(&self) -> bool {
        self.session_approved.load(Ordering::SeqCst)
    }

    pub fn set_session_approved(&self, approved: bool) {
        self.session_approved.store(approved, Ordering::SeqCst);
    }

    /// Decide whether `call` may run. Never raises a prompt for read-only
    /// calls, under an auto-approve policy, or once the operator has
    /// approved the session. An "approve for session" answer holds for every
    /// loop sharing this gate.
    pub async fn check(&self, call: &ToolCall, policy: SessionPolicy) -> ApprovalDecision {
        if !call.sensitivity().is_sensitive() {
            return ApprovalDecision::Approved;
        }
        if policy.auto_approve || self.session_approved() {
            debug!(tool = %call.tool_name, call_id = %call.id, "auto-approved");
            return ApprovalDecision::ApprovedForSession;
        }

        let decision = self.ask_operator(call).await;
        if decision == ApprovalDecision::ApprovedForSession {
            info!("auto-approve enabled for the rest of the session");
            self.set_session_approved(true);
        }
        decision
    }

    async fn ask_operator(&self, call: &ToolCall) -> ApprovalDecision {
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
            preview: preview_call(call),
            created_at: Utc::now(),
        };

        info!(
            request_id = %request.id,
            tool = %call.tool_name,
            call_id = %call.id,
            "requesting operator approval"
        );
        self.prompts.fetch_add(1, Ordering::SeqCst);

        let (response_tx, response_rx) = oneshot::channel();
        if self.request_tx.send((request, response_tx)).await.is_err() {
            warn!(tool = %call.tool_name, "no operator listening, rejecting");
            return ApprovalDecision::Rejected;
        }

        let answer = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, response_rx).await {
                Ok(answer) => answer,
                Err(_) => {
                    info!(tool = %call.tool_name, "approval request timed out");
                    return ApprovalDecision::Rejected;
                }
            },
            None => response_rx.await,
        };
        // A dropped responder counts as a rejection.
        answer.unwrap_or(ApprovalDecision::Rejected)
    }
}
