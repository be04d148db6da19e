use std::collections::BTreeMap;
use std::sync::Arc;

use rvl_approval::{
    ApprovalError, ApprovalRegistry, ApprovalStatus, StagedChange, StagedChangeStore,
    APPROVALS_REQUIRED, REJECTIONS_REQUIRED,
};
use rvl_ledger::{LedgerError, Revision, RevisionInput, RevisionLedger};
use rvl_store::StoreError;
use rvl_types::{ActorRef, Attributes, EntityRef, RevisionAction, StagedChangeId};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventBus};

/// Metadata key linking a `StagedApplied` revision to its staged change.
pub const STAGED_CHANGE_ID: &str = "staged_change_id";

/// Default number of read-decide-write attempts per vote.
pub const DEFAULT_MAX_VOTE_ATTEMPTS: u32 = 8;

/// Result of applying a staged change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedChange {
    pub change: StagedChange,
    /// `None` when the entity is not tracked.
    pub revision: Option<Revision>,
}

#[derive(Clone, Copy)]
enum Ballot {
    Approve,
    Reject,
}

/// Owns the staged change lifecycle: stage, vote, apply, cancel.
///
/// Every write is a compare-and-swap on the lock version of the snapshot the
/// decision was based on. A writer who loses the race re-reads and decides
/// again, so at most one vote ever moves a change out of `Pending` and no
/// committed write is overwritten by a stale one.
pub struct StagedChangeCoordinator {
    ledger: Arc<RevisionLedger>,
    changes: Arc<dyn StagedChangeStore>,
    approvals: Arc<ApprovalRegistry>,
    config: Arc<EngineConfig>,
    events: Arc<EventBus>,
    max_vote_attempts: u32,
}

impl StagedChangeCoordinator {
    pub fn new(
        ledger: Arc<RevisionLedger>,
        changes: Arc<dyn StagedChangeStore>,
        approvals: Arc<ApprovalRegistry>,
        config: Arc<EngineConfig>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            ledger,
            changes,
            approvals,
            config,
            events,
            max_vote_attempts: DEFAULT_MAX_VOTE_ATTEMPTS,
        }
    }

    pub fn with_max_vote_attempts(mut self, attempts: u32) -> Self {
        self.max_vote_attempts = attempts.max(1);
        self
    }

    pub fn approval_registry(&self) -> &Arc<ApprovalRegistry> {
        &self.approvals
    }

    /// Propose `proposed` as a partial update of `entity`.
    ///
    /// Keys the entity type does not allow are dropped. The current values of
    /// the remaining keys are captured as the original snapshot.
    pub fn stage(
        &self,
        entity: &EntityRef,
        proposed: &Attributes,
        reason: Option<String>,
        author: Option<ActorRef>,
    ) -> EngineResult<StagedChange> {
        let current = self.entity_attributes(entity)?;
        let proposed = self.config.filter_attributes(&entity.kind, proposed);
        let original: Attributes = proposed
            .keys()
            .filter_map(|key| current.get(key).map(|value| (key.clone(), value.clone())))
            .collect();

        let diff_strategy = self.config.diff_strategy_for(&entity.kind);
        let approval_strategy = self.config.approval_strategy_for(&entity.kind);
        self.ledger
            .diff_registry()
            .resolve(diff_strategy)
            .map_err(LedgerError::from)?;
        self.approvals
            .resolve(approval_strategy)
            .map_err(ApprovalError::from)?;

        let mut change =
            StagedChange::new(entity.clone(), original, proposed, diff_strategy, approval_strategy)
                .with_reason(reason)
                .authored_by(author.clone());
        if let Some(quorum) = self.config.quorum_override(&entity.kind) {
            change = change
                .with_metadata(APPROVALS_REQUIRED, quorum.approvals_required)
                .with_metadata(REJECTIONS_REQUIRED, quorum.rejections_required);
        }

        self.changes.insert(&change)?;
        tracing::info!(
            change = %change.id,
            %entity,
            keys = change.proposed_values.len(),
            approval = %change.approval_strategy,
            "staged change created"
        );
        self.events.emit(Event::StagedChangeCreated {
            change: change.clone(),
            actor: author,
        });
        Ok(change)
    }

    /// Cast an approving vote. Returns `true` if this vote approved the
    /// change; a quorum may return `false` while the change stays pending.
    pub fn approve(
        &self,
        id: &StagedChangeId,
        voter: Option<ActorRef>,
        comment: Option<String>,
    ) -> EngineResult<bool> {
        self.vote(id, voter, comment, Ballot::Approve)
    }

    /// Cast a rejecting vote. Returns `true` if this vote rejected the change.
    pub fn reject(
        &self,
        id: &StagedChangeId,
        voter: Option<ActorRef>,
        reason: Option<String>,
    ) -> EngineResult<bool> {
        self.vote(id, voter, reason, Ballot::Reject)
    }

    fn vote(
        &self,
        id: &StagedChangeId,
        voter: Option<ActorRef>,
        note: Option<String>,
        ballot: Ballot,
    ) -> EngineResult<bool> {
        for attempt in 1..=self.max_vote_attempts {
            let mut change = self.get(id)?;
            let strategy = self
                .approvals
                .resolve(&change.approval_strategy)
                .map_err(ApprovalError::from)?;
            let decided = match ballot {
                Ballot::Approve => strategy.approve(&mut change, voter.clone(), note.clone())?,
                Ballot::Reject => strategy.reject(&mut change, voter.clone(), note.clone())?,
            };

            if !self.commit(&mut change)? {
                tracing::debug!(change = %id, attempt, "staged change modified concurrently, re-deciding");
                continue;
            }

            tracing::info!(
                change = %id,
                voter = ?voter.as_ref().map(ToString::to_string),
                approved = matches!(ballot, Ballot::Approve),
                status = %change.status,
                decided,
                "vote recorded"
            );
            if decided {
                let actor = voter;
                self.events.emit(match ballot {
                    Ballot::Approve => Event::StagedChangeApproved { change, actor },
                    Ballot::Reject => Event::StagedChangeRejected { change, actor },
                });
            }
            return Ok(decided);
        }

        tracing::warn!(change = %id, attempts = self.max_vote_attempts, "vote gave up after repeated conflicts");
        Err(ApprovalError::StatusConflict(*id).into())
    }

    /// Merge an approved change onto the entity's current values and record
    /// a `StagedApplied` revision when the entity is tracked.
    ///
    /// The change is claimed (`Approved -> Applied`) before the entity is
    /// written, so concurrent appliers cannot both succeed. If the write or
    /// the revision fails, the entity is put back and the claim released.
    pub fn apply(&self, id: &StagedChangeId, actor: Option<ActorRef>) -> EngineResult<AppliedChange> {
        let approved = self.get(id)?;
        if !approved.status.can_be_applied() {
            return Err(EngineError::NotApproved {
                id: *id,
                status: approved.status,
            });
        }
        let entity = approved.entity.clone();
        if !self.ledger.entity_store().exists(&entity)? {
            return Err(EngineError::TargetNotFound(entity));
        }

        let diff = self
            .ledger
            .diff_registry()
            .resolve(&approved.diff_strategy)
            .map_err(LedgerError::from)?;
        let current = self.entity_attributes(&entity)?;
        // Diff against the live values, not the staging-time originals, so a
        // proposed value is written even if it once matched the entity.
        let baseline: Attributes = approved
            .proposed_values
            .keys()
            .filter_map(|key| current.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        let payload = diff.calculate(&baseline, &approved.proposed_values);
        let updated = diff.apply(&current, &payload, false)?;

        let mut applied = approved.clone();
        applied.mark_applied()?;
        if !self.commit(&mut applied)? {
            let status = self.get(id)?.status;
            return Err(EngineError::NotApproved { id: *id, status });
        }

        if let Err(error) = self.write_untracked(&entity, &updated) {
            self.release_claim(&approved, &applied);
            return Err(error.into());
        }

        let revision = if self.config.is_tracked(&entity.kind) {
            let kind = &entity.kind;
            let recorded = self.ledger.record(
                RevisionInput::new(
                    entity.clone(),
                    RevisionAction::StagedApplied,
                    self.config.filter_attributes(kind, &current),
                    self.config.filter_attributes(kind, &updated),
                    applied.diff_strategy.clone(),
                )
                .caused_by(actor.clone())
                .with_metadata(STAGED_CHANGE_ID, applied.id.to_string()),
            );
            match recorded {
                Ok(revision) => revision,
                Err(error) => {
                    if let Err(rollback) = self.write_untracked(&entity, &current) {
                        tracing::warn!(change = %id, %entity, %rollback, "could not roll back unrecorded apply");
                    }
                    self.release_claim(&approved, &applied);
                    return Err(error.into());
                }
            }
        } else {
            None
        };

        tracing::info!(
            change = %id,
            %entity,
            version = ?revision.as_ref().map(|r| r.version),
            "staged change applied"
        );
        if let Some(revision) = &revision {
            self.events.emit(Event::RevisionAppended {
                revision: revision.clone(),
            });
        }
        self.events.emit(Event::StagedChangeApplied {
            change: applied.clone(),
            revision: revision.clone(),
            actor,
        });
        Ok(AppliedChange {
            change: applied,
            revision,
        })
    }

    /// Merge `partial` into a pending change's proposed values.
    ///
    /// Newly proposed keys have their current entity values captured in the
    /// original snapshot.
    pub fn update_proposed_values(
        &self,
        id: &StagedChangeId,
        partial: &Attributes,
    ) -> EngineResult<StagedChange> {
        for attempt in 1..=self.max_vote_attempts {
            let mut change = self.get(id)?;
            let partial = self.config.filter_attributes(&change.entity.kind, partial);

            if change.status.is_mutable() {
                let current = self.entity_attributes(&change.entity)?;
                for key in partial.keys() {
                    if change.original_values.contains_key(key)
                        || change.proposed_values.contains_key(key)
                    {
                        continue;
                    }
                    if let Some(value) = current.get(key) {
                        change.original_values.insert(key.clone(), value.clone());
                    }
                }
            }
            change.merge_proposed(partial)?;

            if !self.commit(&mut change)? {
                tracing::debug!(change = %id, attempt, "staged change modified concurrently, re-merging");
                continue;
            }
            tracing::debug!(change = %id, keys = change.proposed_values.len(), "proposed values updated");
            return Ok(change);
        }
        Err(ApprovalError::StatusConflict(*id).into())
    }

    /// Move a non-terminal change to `Cancelled`.
    pub fn cancel(&self, id: &StagedChangeId, actor: Option<ActorRef>) -> EngineResult<StagedChange> {
        for attempt in 1..=self.max_vote_attempts {
            let mut change = self.get(id)?;
            let status = change.status;
            change.cancel()?;

            if !self.commit(&mut change)? {
                tracing::debug!(change = %id, attempt, "staged change modified concurrently, retrying cancel");
                continue;
            }
            tracing::info!(change = %id, previous = %status, "staged change cancelled");
            self.events.emit(Event::StagedChangeCancelled {
                change: change.clone(),
                actor,
            });
            return Ok(change);
        }
        Err(ApprovalError::StatusConflict(*id).into())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &StagedChangeId) -> EngineResult<StagedChange> {
        self.changes
            .get(id)?
            .ok_or_else(|| ApprovalError::NotFound(*id).into())
    }

    pub fn for_entity(&self, entity: &EntityRef) -> EngineResult<Vec<StagedChange>> {
        Ok(self.changes.for_entity(entity)?)
    }

    pub fn status(&self, id: &StagedChangeId) -> EngineResult<ApprovalStatus> {
        let change = self.get(id)?;
        let strategy = self
            .approvals
            .resolve(&change.approval_strategy)
            .map_err(ApprovalError::from)?;
        Ok(strategy.status(&change))
    }

    pub fn can_approve(&self, id: &StagedChangeId, voter: Option<&ActorRef>) -> EngineResult<bool> {
        let change = self.get(id)?;
        let strategy = self
            .approvals
            .resolve(&change.approval_strategy)
            .map_err(ApprovalError::from)?;
        Ok(strategy.can_approve(&change, voter))
    }

    pub fn can_reject(&self, id: &StagedChangeId, voter: Option<&ActorRef>) -> EngineResult<bool> {
        let change = self.get(id)?;
        let strategy = self
            .approvals
            .resolve(&change.approval_strategy)
            .map_err(ApprovalError::from)?;
        Ok(strategy.can_reject(&change, voter))
    }

    pub fn describe(&self, id: &StagedChangeId) -> EngineResult<BTreeMap<String, String>> {
        Ok(self.get(id)?.describe(self.ledger.diff_registry())?)
    }

    /// Compare-and-swap `change` against the lock version it was read at,
    /// advancing the caller's copy on success.
    fn commit(&self, change: &mut StagedChange) -> EngineResult<bool> {
        let expected = change.lock_version;
        if !self.changes.compare_and_swap(expected, change)? {
            return Ok(false);
        }
        change.lock_version = expected + 1;
        Ok(true)
    }

    /// Put a claimed change back to `Approved` after its apply failed.
    fn release_claim(&self, approved: &StagedChange, applied: &StagedChange) {
        let mut released = StagedChange {
            lock_version: applied.lock_version,
            ..approved.clone()
        };
        match self.commit(&mut released) {
            Ok(true) => tracing::debug!(change = %approved.id, "apply claim released"),
            Ok(false) => tracing::warn!(change = %approved.id, "apply claim changed before release"),
            Err(error) => tracing::warn!(change = %approved.id, %error, "could not release apply claim"),
        }
    }

    fn write_untracked(&self, entity: &EntityRef, attributes: &Attributes) -> Result<(), StoreError> {
        let _guard = self.ledger.without_tracking(entity);
        self.ledger.entity_store().set_attributes(entity, attributes)
    }

    fn entity_attributes(&self, entity: &EntityRef) -> EngineResult<Attributes> {
        self.ledger
            .entity_store()
            .attributes(entity)
            .map_err(|error| match error {
                StoreError::NotFound(entity) => EngineError::TargetNotFound(entity),
                other => other.into(),
            })
    }
}

impl std::fmt::Debug for StagedChangeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedChangeCoordinator")
            .field("approvals", &self.approvals)
            .field("events", &self.events)
            .field("max_vote_attempts", &self.max_vote_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rvl_approval::{default_approval_registry, InMemoryStagedChangeStore, QuorumThresholds};
    use rvl_diff::default_diff_registry;
    use rvl_ledger::InMemoryRevisionStore;
    use rvl_store::InMemoryEntityStore;
    use rvl_types::StagedChangeStatus;
    use serde_json::json;

    use super::*;

    fn coordinator(config: EngineConfig) -> StagedChangeCoordinator {
        let ledger = Arc::new(RevisionLedger::new(
            Arc::new(InMemoryRevisionStore::new()),
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(default_diff_registry()),
        ));
        let approvals = Arc::new(default_approval_registry(config.quorum));
        StagedChangeCoordinator::new(
            ledger,
            Arc::new(InMemoryStagedChangeStore::new()),
            approvals,
            Arc::new(config),
            Arc::new(EventBus::default()),
        )
    }

    fn seeded(config: EngineConfig) -> (StagedChangeCoordinator, EntityRef) {
        let coordinator = coordinator(config);
        let post = EntityRef::new("post", "1");
        coordinator
            .ledger
            .entity_store()
            .insert(&post, &[("title".to_string(), json!("Old"))].into())
            .unwrap();
        (coordinator, post)
    }

    fn title(value: &str) -> Attributes {
        [("title".to_string(), json!(value))].into()
    }

    #[test]
    fn stage_snapshots_current_values() {
        let (coordinator, post) = seeded(EngineConfig::default());
        let change = coordinator
            .stage(&post, &title("New"), Some("typo".into()), Some(ActorRef::user("alice")))
            .unwrap();

        assert_eq!(change.original_values, title("Old"));
        assert_eq!(change.author, Some(ActorRef::user("alice")));
        assert_eq!(change.diff_strategy, "attribute");
        assert_eq!(coordinator.for_entity(&post).unwrap(), vec![change.clone()]);
        assert_eq!(
            coordinator.describe(&change.id).unwrap()["title"],
            r#"changed from "Old" to "New""#
        );
    }

    #[test]
    fn can_vote_reflects_strategy_and_status() {
        let config = EngineConfig {
            default_approval_strategy: "quorum".into(),
            quorum: QuorumThresholds {
                approvals_required: 2,
                rejections_required: 2,
            },
            ..EngineConfig::default()
        };
        let (coordinator, post) = seeded(config);
        let change = coordinator.stage(&post, &title("New"), None, None).unwrap();
        let alice = ActorRef::user("alice");

        assert!(!coordinator.can_approve(&change.id, None).unwrap());
        assert!(coordinator.can_approve(&change.id, Some(&alice)).unwrap());
        coordinator.reject(&change.id, Some(alice.clone()), None).unwrap();
        assert!(!coordinator.can_reject(&change.id, Some(&alice)).unwrap());

        let status = coordinator.status(&change.id).unwrap();
        assert_eq!(status.rejections_required, 2);
        assert_eq!(status.remaining_rejections, 1);
    }

    #[test]
    fn anonymous_quorum_vote_surfaces_approval_error() {
        let config = EngineConfig {
            default_approval_strategy: "quorum".into(),
            ..EngineConfig::default()
        };
        let (coordinator, post) = seeded(config);
        let change = coordinator.stage(&post, &title("New"), None, None).unwrap();

        let error = coordinator.approve(&change.id, None, None).unwrap_err();
        assert!(matches!(
            error,
            EngineError::Approval(ApprovalError::AnonymousVoter { .. })
        ));
        assert!(!error.is_retryable());
    }

    #[test]
    fn unknown_change_is_not_found() {
        let (coordinator, _) = seeded(EngineConfig::default());
        let id = StagedChangeId::new();
        assert_eq!(
            coordinator.get(&id).unwrap_err(),
            EngineError::Approval(ApprovalError::NotFound(id))
        );
        assert!(coordinator.apply(&id, None).is_err());
    }

    #[test]
    fn new_keys_capture_originals_on_update() {
        let (coordinator, post) = seeded(EngineConfig::default());
        let change = coordinator.stage(&post, &Attributes::new(), None, None).unwrap();
        assert!(change.original_values.is_empty());

        let updated = coordinator
            .update_proposed_values(&change.id, &title("Newer"))
            .unwrap();
        assert_eq!(updated.original_values, title("Old"));
        assert_eq!(coordinator.get(&change.id).unwrap().proposed_values, title("Newer"));
    }

    #[test]
    fn stale_vote_snapshot_cannot_drop_merged_values() {
        let config = EngineConfig {
            default_approval_strategy: "quorum".into(),
            ..EngineConfig::default()
        };
        let (coordinator, post) = seeded(config);
        let change = coordinator.stage(&post, &title("New"), None, None).unwrap();

        let mut stale = coordinator.get(&change.id).unwrap();
        let quorum = coordinator.approvals.resolve("quorum").unwrap();
        quorum
            .approve(&mut stale, Some(ActorRef::user("alice")), None)
            .unwrap();

        let body: Attributes = [("body".to_string(), json!("c"))].into();
        coordinator.update_proposed_values(&change.id, &body).unwrap();

        assert!(!coordinator.commit(&mut stale).unwrap());
        let stored = coordinator.get(&change.id).unwrap();
        assert_eq!(stored.proposed_values["body"], json!("c"));
        assert!(stored.votes.is_empty());

        // A fresh vote re-reads and keeps the merge.
        coordinator
            .approve(&change.id, Some(ActorRef::user("alice")), None)
            .unwrap();
        let stored = coordinator.get(&change.id).unwrap();
        assert_eq!(stored.votes.len(), 1);
        assert_eq!(stored.proposed_values["body"], json!("c"));
        assert_eq!(stored.proposed_values["title"], json!("New"));
    }

    #[test]
    fn returned_changes_match_stored_lock_version() {
        let (coordinator, post) = seeded(EngineConfig::default());
        let change = coordinator.stage(&post, &title("New"), None, None).unwrap();
        assert_eq!(change.lock_version, 0);

        let merged = coordinator
            .update_proposed_values(&change.id, &title("Newer"))
            .unwrap();
        assert_eq!(merged, coordinator.get(&change.id).unwrap());

        let cancelled = coordinator.cancel(&change.id, None).unwrap();
        assert_eq!(cancelled.status, StagedChangeStatus::Cancelled);
        assert_eq!(cancelled.lock_version, 2);
        assert_eq!(cancelled, coordinator.get(&change.id).unwrap());
    }
}
