use std::sync::Arc;

use rvl_types::{ActorRef, Strategy, StrategyRegistry};
use serde::{Deserialize, Serialize};

use crate::error::{ApprovalError, ApprovalResult};
use crate::quorum::QuorumApproval;
use crate::records::{ApprovalStatus, StagedChange};
use crate::single::SingleApproval;

/// Decision logic over a staged change's vote history.
///
/// Strategies mutate only the in-memory copy handed to them. Persisting the
/// result atomically against concurrent voters is the caller's job.
pub trait ApprovalStrategy: Strategy {
    fn can_approve(&self, change: &StagedChange, voter: Option<&ActorRef>) -> bool;

    fn can_reject(&self, change: &StagedChange, voter: Option<&ActorRef>) -> bool;

    /// Record an approving vote. Returns `true` if this vote moved the change
    /// to `Approved`.
    fn approve(
        &self,
        change: &mut StagedChange,
        voter: Option<ActorRef>,
        comment: Option<String>,
    ) -> ApprovalResult<bool>;

    /// Record a rejecting vote. Returns `true` if this vote moved the change
    /// to `Rejected`.
    fn reject(
        &self,
        change: &mut StagedChange,
        voter: Option<ActorRef>,
        reason: Option<String>,
    ) -> ApprovalResult<bool>;

    fn status(&self, change: &StagedChange) -> ApprovalStatus;
}

/// Registry of approval strategies keyed by identifier.
pub type ApprovalRegistry = StrategyRegistry<dyn ApprovalStrategy>;

/// A registry holding `single` and a `quorum` using `quorum` as its
/// process-wide thresholds.
pub fn default_approval_registry(quorum: QuorumThresholds) -> ApprovalRegistry {
    let registry = ApprovalRegistry::new("approval");
    let builtins: [Arc<dyn ApprovalStrategy>; 2] = [
        Arc::new(SingleApproval),
        Arc::new(QuorumApproval::new(quorum)),
    ];
    for strategy in builtins {
        // Fresh registry with distinct identifiers: registration cannot collide.
        let _ = registry.register(strategy);
    }
    registry
}

/// Approval and rejection thresholds for quorum voting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumThresholds {
    pub approvals_required: u32,
    pub rejections_required: u32,
}

impl Default for QuorumThresholds {
    fn default() -> Self {
        Self {
            approvals_required: 2,
            rejections_required: 1,
        }
    }
}

/// Fails unless the change is still open for votes.
pub(crate) fn ensure_open(change: &StagedChange, action: &'static str) -> ApprovalResult<()> {
    if change.status.is_open_for_votes() {
        Ok(())
    } else {
        Err(ApprovalError::InvalidTransition {
            status: change.status,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_builtins() {
        let registry = default_approval_registry(QuorumThresholds::default());
        assert_eq!(registry.list(), vec!["quorum".to_string(), "single".to_string()]);
        assert_eq!(registry.kind(), "approval");
    }

    #[test]
    fn unknown_identifier_maps_to_approval_error() {
        let registry = default_approval_registry(QuorumThresholds::default());
        let error: ApprovalError = registry.resolve("unanimous").err().unwrap().into();
        assert_eq!(error, ApprovalError::UnknownApprovalStrategy("unanimous".into()));
    }

    #[test]
    fn thresholds_deserialize_with_defaults() {
        let parsed: QuorumThresholds =
            serde_json::from_value(serde_json::json!({"approvals_required": 3})).unwrap();
        assert_eq!(parsed.approvals_required, 3);
        assert_eq!(parsed.rejections_required, 1);
    }
}
