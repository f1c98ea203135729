//! # swe-approval
//!
//! Decides whether a requested tool call may run. Read-only calls pass
//! straight through; sensitive calls pass when the session auto-approves and
//! otherwise wait for the operator, who sees a preview of the action.

pub mod approval;
pub mod preview;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalReceiver, ApprovalRequest, PendingApproval,
    SessionPolicy,
};
pub use preview::{ActionPreview, preview_call};
