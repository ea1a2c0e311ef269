//! crates/originality_core/src/workflow/refund.rs
//!
//! What happens to an already-debited charge when the scoring call fails.

use super::error::WorkflowError;

pub trait RefundPolicy: Send + Sync {
    fn should_refund(&self, failure: &WorkflowError) -> bool;
}

/// Keeps the charge; failed scans are settled manually by support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefund;

impl RefundPolicy for NoRefund {
    fn should_refund(&self, _failure: &WorkflowError) -> bool {
        false
    }
}

/// Gives the credits back whenever the scoring step itself failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefundOnFailure;

impl RefundPolicy for RefundOnFailure {
    fn should_refund(&self, failure: &WorkflowError) -> bool {
        matches!(
            failure,
            WorkflowError::ScoringApi { .. } | WorkflowError::Unexpected(_)
        )
    }
}
