use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rvl_diff::{changed_fields, DiffPayload, DiffRegistry};
use rvl_types::{ActorRef, Attributes, EntityRef, StagedChangeId, StagedChangeStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApprovalError, ApprovalResult};

/// One approve or reject vote on a staged change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: Option<ActorRef>,
    pub approved: bool,
    pub comment: Option<String>,
    /// 1-based position in the staged change's vote list.
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
}

/// A proposed modification to an entity, held until an approval strategy
/// decides on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChange {
    pub id: StagedChangeId,
    pub entity: EntityRef,
    pub status: StagedChangeStatus,
    pub diff_strategy: String,
    pub approval_strategy: String,
    /// Current values of the proposed keys at staging time.
    pub original_values: Attributes,
    pub proposed_values: Attributes,
    pub reason: Option<String>,
    pub rejection_reason: Option<String>,
    pub approval_metadata: BTreeMap<String, Value>,
    pub author: Option<ActorRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub votes: Vec<Vote>,
    /// Bumped by the store on every committed write.
    #[serde(default)]
    pub lock_version: u64,
}

impl StagedChange {
    pub fn new(
        entity: EntityRef,
        original_values: Attributes,
        proposed_values: Attributes,
        diff_strategy: impl Into<String>,
        approval_strategy: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: StagedChangeId::new(),
            entity,
            status: StagedChangeStatus::Pending,
            diff_strategy: diff_strategy.into(),
            approval_strategy: approval_strategy.into(),
            original_values,
            proposed_values,
            reason: None,
            rejection_reason: None,
            approval_metadata: BTreeMap::new(),
            author: None,
            created_at: now,
            updated_at: now,
            applied_at: None,
            votes: Vec::new(),
            lock_version: 0,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn authored_by(mut self, author: Option<ActorRef>) -> Self {
        self.author = author;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.approval_metadata.insert(key.into(), value.into());
        self
    }

    // -----------------------------------------------------------------------
    // Votes
    // -----------------------------------------------------------------------

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn approvals(&self) -> u32 {
        self.votes.iter().filter(|v| v.approved).count() as u32
    }

    pub fn rejections(&self) -> u32 {
        self.votes.iter().filter(|v| !v.approved).count() as u32
    }

    /// Returns `true` if `actor` has cast any vote, of either polarity.
    pub fn has_voted(&self, actor: &ActorRef) -> bool {
        self.votes.iter().any(|v| v.voter.as_ref() == Some(actor))
    }

    /// Append a vote. Strategies call this after their own checks.
    pub fn record_vote(
        &mut self,
        voter: Option<ActorRef>,
        approved: bool,
        comment: Option<String>,
    ) -> &Vote {
        let now = Utc::now();
        self.votes.push(Vote {
            voter,
            approved,
            comment,
            sequence: self.votes.len() as u32 + 1,
            created_at: now,
        });
        self.updated_at = now;
        &self.votes[self.votes.len() - 1]
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    pub fn set_status(&mut self, status: StagedChangeStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// `Approved -> Applied`, stamping `applied_at`.
    pub fn mark_applied(&mut self) -> ApprovalResult<()> {
        if !self.status.can_be_applied() {
            return Err(ApprovalError::InvalidTransition {
                status: self.status,
                action: "apply",
            });
        }
        let now = Utc::now();
        self.status = StagedChangeStatus::Applied;
        self.applied_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Any non-terminal status -> `Cancelled`.
    pub fn cancel(&mut self) -> ApprovalResult<()> {
        if self.status.is_terminal() {
            return Err(ApprovalError::AlreadyTerminal(self.status));
        }
        self.set_status(StagedChangeStatus::Cancelled);
        Ok(())
    }

    /// Merge `partial` into the proposed values. Pending only.
    pub fn merge_proposed(&mut self, partial: Attributes) -> ApprovalResult<()> {
        if !self.status.is_mutable() {
            return Err(ApprovalError::InvalidTransition {
                status: self.status,
                action: "modify",
            });
        }
        self.proposed_values.extend(partial);
        self.updated_at = Utc::now();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Diff views
    // -----------------------------------------------------------------------

    /// Proposed keys whose value differs from the original.
    pub fn changed_keys(&self) -> Vec<String> {
        changed_fields(&self.original_values, &self.proposed_values)
            .into_keys()
            .collect()
    }

    /// Payload from original to proposed values, encoded by this change's
    /// own diff strategy.
    pub fn diff(&self, diffs: &DiffRegistry) -> ApprovalResult<DiffPayload> {
        let strategy = diffs.resolve(&self.diff_strategy)?;
        Ok(strategy.calculate(&self.original_values, &self.proposed_values))
    }

    pub fn describe(&self, diffs: &DiffRegistry) -> ApprovalResult<BTreeMap<String, String>> {
        let strategy = diffs.resolve(&self.diff_strategy)?;
        let payload = strategy.calculate(&self.original_values, &self.proposed_values);
        Ok(strategy.describe(&payload)?)
    }
}

/// Progress report produced by [`crate::ApprovalStrategy::status`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    pub strategy: String,
    pub status: StagedChangeStatus,
    pub approvals_required: u32,
    pub approvals_received: u32,
    pub rejections_required: u32,
    pub rejections_received: u32,
    pub remaining_approvals: u32,
    pub remaining_rejections: u32,
    pub can_vote: bool,
}
