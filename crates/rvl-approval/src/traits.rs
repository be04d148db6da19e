use rvl_types::{EntityRef, StagedChangeId};

use crate::error::ApprovalResult;
use crate::records::StagedChange;

/// Storage boundary for staged changes.
///
/// Every write after insert goes through [`Self::compare_and_swap`], keyed on
/// [`StagedChange::lock_version`], so a writer holding a stale snapshot can
/// never overwrite a committed vote, merge or status change.
pub trait StagedChangeStore: Send + Sync {
    /// Persist a new staged change.
    fn insert(&self, change: &StagedChange) -> ApprovalResult<()>;

    /// Read a staged change by id. `Ok(None)` if absent.
    fn get(&self, id: &StagedChangeId) -> ApprovalResult<Option<StagedChange>>;

    /// Replace the stored change with `updated` only if the stored copy is
    /// still at `expected_lock_version`. The stored copy is written with
    /// `lock_version = expected_lock_version + 1`.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    fn compare_and_swap(
        &self,
        expected_lock_version: u64,
        updated: &StagedChange,
    ) -> ApprovalResult<bool>;

    /// Every staged change targeting the entity, oldest first.
    fn for_entity(&self, entity: &EntityRef) -> ApprovalResult<Vec<StagedChange>>;
}
