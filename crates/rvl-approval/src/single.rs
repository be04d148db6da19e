use rvl_types::{ActorRef, StagedChangeStatus, Strategy};

use crate::error::ApprovalResult;
use crate::records::{ApprovalStatus, StagedChange};
use crate::strategy::{ensure_open, ApprovalStrategy};

/// One vote decides: the first approve or reject is final.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleApproval;

impl SingleApproval {
    pub const IDENTIFIER: &'static str = "single";
}

impl Strategy for SingleApproval {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }
}

impl ApprovalStrategy for SingleApproval {
    fn can_approve(&self, change: &StagedChange, _voter: Option<&ActorRef>) -> bool {
        change.status.is_open_for_votes()
    }

    fn can_reject(&self, change: &StagedChange, _voter: Option<&ActorRef>) -> bool {
        change.status.is_open_for_votes()
    }

    fn approve(
        &self,
        change: &mut StagedChange,
        voter: Option<ActorRef>,
        comment: Option<String>,
    ) -> ApprovalResult<bool> {
        ensure_open(change, "approve")?;
        change.record_vote(voter, true, comment);
        change.set_status(StagedChangeStatus::Approved);
        Ok(true)
    }

    fn reject(
        &self,
        change: &mut StagedChange,
        voter: Option<ActorRef>,
        reason: Option<String>,
    ) -> ApprovalResult<bool> {
        ensure_open(change, "reject")?;
        change.record_vote(voter, false, reason.clone());
        change.rejection_reason = reason;
        change.set_status(StagedChangeStatus::Rejected);
        Ok(true)
    }

    fn status(&self, change: &StagedChange) -> ApprovalStatus {
        let approvals = change.approvals();
        let rejections = change.rejections();
        ApprovalStatus {
            strategy: Self::IDENTIFIER.to_string(),
            status: change.status,
            approvals_required: 1,
            approvals_received: approvals,
            rejections_required: 1,
            rejections_received: rejections,
            remaining_approvals: 1u32.saturating_sub(approvals),
            remaining_rejections: 1u32.saturating_sub(rejections),
            can_vote: change.status.is_open_for_votes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rvl_types::{Attributes, EntityRef};

    use super::*;
    use crate::error::ApprovalError;

    fn change() -> StagedChange {
        StagedChange::new(
            EntityRef::new("post", "1"),
            Attributes::new(),
            Attributes::new(),
            "attribute",
            SingleApproval::IDENTIFIER,
        )
    }

    #[test]
    fn one_approval_decides() {
        let mut change = change();
        let alice = ActorRef::user("alice");
        assert!(SingleApproval.can_approve(&change, Some(&alice)));

        assert!(SingleApproval.approve(&mut change, Some(alice), Some("lgtm".into())).unwrap());
        assert_eq!(change.status, StagedChangeStatus::Approved);
        assert_eq!(change.votes[0].comment.as_deref(), Some("lgtm"));

        let status = SingleApproval.status(&change);
        assert_eq!(status.approvals_required, 1);
        assert_eq!(status.remaining_approvals, 0);
        assert!(!status.can_vote);
    }

    #[test]
    fn one_rejection_decides_and_keeps_reason() {
        let mut change = change();
        assert!(SingleApproval.reject(&mut change, None, Some("spam".into())).unwrap());
        assert_eq!(change.status, StagedChangeStatus::Rejected);
        assert_eq!(change.rejection_reason.as_deref(), Some("spam"));
    }

    #[test]
    fn decided_change_refuses_further_votes() {
        let mut change = change();
        SingleApproval.approve(&mut change, None, None).unwrap();
        assert!(!SingleApproval.can_reject(&change, None));

        let error = SingleApproval.reject(&mut change, None, None).unwrap_err();
        assert_eq!(
            error,
            ApprovalError::InvalidTransition {
                status: StagedChangeStatus::Approved,
                action: "reject"
            }
        );
        assert_eq!(change.votes.len(), 1);
    }
}
