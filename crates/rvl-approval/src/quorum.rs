use rvl_types::{ActorRef, StagedChangeStatus, Strategy};
use serde_json::Value;

use crate::error::{ApprovalError, ApprovalResult};
use crate::records::{ApprovalStatus, StagedChange};
use crate::strategy::{ensure_open, ApprovalStrategy, QuorumThresholds};

/// Metadata key overriding the approval threshold for one staged change.
pub const APPROVALS_REQUIRED: &str = "approvals_required";
/// Metadata key overriding the rejection threshold for one staged change.
pub const REJECTIONS_REQUIRED: &str = "rejections_required";
/// Metadata keys holding vote progress, refreshed on every vote.
pub const APPROVALS_RECEIVED: &str = "approvals_received";
pub const REJECTIONS_RECEIVED: &str = "rejections_received";

/// N-of-M voting with independent approval and rejection thresholds.
///
/// Each identified voter gets one vote per staged change, of either polarity.
/// Anonymous votes are refused since they cannot be deduplicated.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuorumApproval {
    defaults: QuorumThresholds,
}

impl QuorumApproval {
    pub const IDENTIFIER: &'static str = "quorum";

    pub fn new(defaults: QuorumThresholds) -> Self {
        Self { defaults }
    }

    /// Thresholds for `change`: its own metadata first, then this strategy's
    /// defaults. Zero or non-integer metadata values are ignored.
    pub fn thresholds(&self, change: &StagedChange) -> QuorumThresholds {
        let read = |key: &str, fallback: u32| {
            change
                .approval_metadata
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(fallback)
        };
        QuorumThresholds {
            approvals_required: read(APPROVALS_REQUIRED, self.defaults.approvals_required),
            rejections_required: read(REJECTIONS_REQUIRED, self.defaults.rejections_required),
        }
    }

    fn can_vote(&self, change: &StagedChange, voter: Option<&ActorRef>) -> bool {
        change.status.is_open_for_votes() && voter.is_some_and(|v| !change.has_voted(v))
    }

    /// Checks shared by approve and reject, in the order callers expect the
    /// errors: status first, then voter identity, then duplicates.
    fn admit<'a>(
        &self,
        change: &StagedChange,
        voter: Option<&'a ActorRef>,
        action: &'static str,
    ) -> ApprovalResult<&'a ActorRef> {
        ensure_open(change, action)?;
        let voter = voter.ok_or_else(|| ApprovalError::AnonymousVoter {
            strategy: Self::IDENTIFIER.to_string(),
        })?;
        if change.has_voted(voter) {
            return Err(ApprovalError::DuplicateVote {
                voter: voter.clone(),
            });
        }
        Ok(voter)
    }

    fn record_progress(change: &mut StagedChange) {
        let (approvals, rejections) = (change.approvals(), change.rejections());
        change
            .approval_metadata
            .insert(APPROVALS_RECEIVED.into(), approvals.into());
        change
            .approval_metadata
            .insert(REJECTIONS_RECEIVED.into(), rejections.into());
    }
}

impl Strategy for QuorumApproval {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }
}

impl ApprovalStrategy for QuorumApproval {
    fn can_approve(&self, change: &StagedChange, voter: Option<&ActorRef>) -> bool {
        self.can_vote(change, voter)
    }

    fn can_reject(&self, change: &StagedChange, voter: Option<&ActorRef>) -> bool {
        self.can_vote(change, voter)
    }

    fn approve(
        &self,
        change: &mut StagedChange,
        voter: Option<ActorRef>,
        comment: Option<String>,
    ) -> ApprovalResult<bool> {
        self.admit(change, voter.as_ref(), "approve")?;
        change.record_vote(voter, true, comment);
        Self::record_progress(change);

        let required = self.thresholds(change).approvals_required;
        let received = change.approvals();
        tracing::debug!(change = %change.id, received, required, "quorum approval recorded");
        if received >= required {
            change.set_status(StagedChangeStatus::Approved);
            return Ok(true);
        }
        Ok(false)
    }

    fn reject(
        &self,
        change: &mut StagedChange,
        voter: Option<ActorRef>,
        reason: Option<String>,
    ) -> ApprovalResult<bool> {
        self.admit(change, voter.as_ref(), "reject")?;
        change.record_vote(voter, false, reason.clone());
        Self::record_progress(change);

        let required = self.thresholds(change).rejections_required;
        let received = change.rejections();
        tracing::debug!(change = %change.id, received, required, "quorum rejection recorded");
        if received >= required {
            change.rejection_reason = reason;
            change.set_status(StagedChangeStatus::Rejected);
            return Ok(true);
        }
        Ok(false)
    }

    fn status(&self, change: &StagedChange) -> ApprovalStatus {
        let thresholds = self.thresholds(change);
        let approvals = change.approvals();
        let rejections = change.rejections();
        ApprovalStatus {
            strategy: Self::IDENTIFIER.to_string(),
            status: change.status,
            approvals_required: thresholds.approvals_required,
            approvals_received: approvals,
            rejections_required: thresholds.rejections_required,
            rejections_received: rejections,
            remaining_approvals: thresholds.approvals_required.saturating_sub(approvals),
            remaining_rejections: thresholds.rejections_required.saturating_sub(rejections),
            can_vote: change.status.is_open_for_votes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rvl_types::{Attributes, EntityRef};

    use super::*;

    fn change() -> StagedChange {
        StagedChange::new(
            EntityRef::new("post", "1"),
            Attributes::new(),
            Attributes::new(),
            "attribute",
            QuorumApproval::IDENTIFIER,
        )
    }

    fn user(id: &str) -> Option<ActorRef> {
        Some(ActorRef::user(id))
    }

    #[test]
    fn two_of_n_approves_on_second_vote() {
        let quorum = QuorumApproval::default();
        let mut change = change();

        assert!(!quorum.approve(&mut change, user("a"), None).unwrap());
        assert_eq!(change.status, StagedChangeStatus::Pending);
        assert_eq!(quorum.status(&change).approvals_received, 1);
        assert_eq!(change.approval_metadata[APPROVALS_RECEIVED], 1);

        assert!(quorum.approve(&mut change, user("b"), None).unwrap());
        let status = quorum.status(&change);
        assert_eq!(status.status, StagedChangeStatus::Approved);
        assert_eq!(status.approvals_received, 2);
        assert_eq!(status.remaining_approvals, 0);
    }

    #[test]
    fn one_vote_per_voter_regardless_of_polarity() {
        let quorum = QuorumApproval::new(QuorumThresholds {
            approvals_required: 3,
            rejections_required: 3,
        });
        let mut change = change();
        let alice = ActorRef::user("alice");

        quorum.approve(&mut change, Some(alice.clone()), None).unwrap();
        assert!(!quorum.can_approve(&change, Some(&alice)));
        assert!(!quorum.can_reject(&change, Some(&alice)));
        assert!(quorum.can_reject(&change, user("bob").as_ref()));

        let error = quorum.reject(&mut change, Some(alice.clone()), None).unwrap_err();
        assert_eq!(error, ApprovalError::DuplicateVote { voter: alice });
        assert_eq!(change.vote_count(), 1);
    }

    #[test]
    fn anonymous_votes_are_refused() {
        let quorum = QuorumApproval::default();
        let mut change = change();
        assert!(!quorum.can_approve(&change, None));
        assert!(matches!(
            quorum.approve(&mut change, None, None).unwrap_err(),
            ApprovalError::AnonymousVoter { .. }
        ));
        assert!(change.votes.is_empty());
    }

    #[test]
    fn rejection_threshold_is_independent() {
        let quorum = QuorumApproval::default();
        let mut change = change();
        quorum.approve(&mut change, user("a"), None).unwrap();

        assert!(quorum.reject(&mut change, user("b"), Some("no".into())).unwrap());
        assert_eq!(change.status, StagedChangeStatus::Rejected);
        assert_eq!(change.rejection_reason.as_deref(), Some("no"));

        let status = quorum.status(&change);
        assert_eq!((status.approvals_received, status.rejections_received), (1, 1));
        assert_eq!(status.remaining_approvals, 1);
        assert!(!status.can_vote);
    }

    #[test]
    fn metadata_overrides_defaults() {
        let quorum = QuorumApproval::new(QuorumThresholds {
            approvals_required: 5,
            rejections_required: 4,
        });
        let change = change()
            .with_metadata(APPROVALS_REQUIRED, 1)
            .with_metadata(REJECTIONS_REQUIRED, 0);

        let thresholds = quorum.thresholds(&change);
        assert_eq!(thresholds.approvals_required, 1);
        // Zero is not a usable threshold; the default stands.
        assert_eq!(thresholds.rejections_required, 4);
    }

    #[test]
    fn terminal_change_refuses_votes() {
        let quorum = QuorumApproval::default();
        let mut change = change();
        change.set_status(StagedChangeStatus::Cancelled);

        let error = quorum.approve(&mut change, user("a"), None).unwrap_err();
        assert_eq!(
            error,
            ApprovalError::InvalidTransition {
                status: StagedChangeStatus::Cancelled,
                action: "approve"
            }
        );
    }
}
