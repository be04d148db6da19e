use rvl_types::{EntityRef, RevisionId};

use crate::error::LedgerResult;
use crate::records::Revision;

/// Storage boundary for revisions.
///
/// Backends must make `insert` fail with
/// [`crate::LedgerError::VersionConflict`] unless the revision's version is
/// exactly one past the entity's latest stored version. A unique constraint on
/// `(entity, version)` is the minimum acceptable enforcement; it turns a lost
/// race into a retryable conflict instead of silently skipped history.
pub trait RevisionStore: Send + Sync {
    /// Persist a new revision.
    fn insert(&self, revision: &Revision) -> LedgerResult<()>;

    /// Highest stored version for the entity, `0` if it has no history.
    fn latest_version(&self, entity: &EntityRef) -> LedgerResult<u32>;

    /// Read one revision by version. `Ok(None)` if absent.
    fn get(&self, entity: &EntityRef, version: u32) -> LedgerResult<Option<Revision>>;

    /// Read one revision by id. `Ok(None)` if absent.
    fn get_by_id(&self, id: &RevisionId) -> LedgerResult<Option<Revision>>;

    /// Revisions with `from <= version <= to`, ascending.
    fn read_range(&self, entity: &EntityRef, from: u32, to: u32) -> LedgerResult<Vec<Revision>>;

    /// Full history of the entity, ascending.
    fn read_all(&self, entity: &EntityRef) -> LedgerResult<Vec<Revision>>;

    /// Every entity with at least one revision.
    fn entities(&self) -> LedgerResult<Vec<EntityRef>>;

    /// Number of revisions stored for the entity.
    fn count(&self, entity: &EntityRef) -> LedgerResult<u64> {
        Ok(u64::from(self.latest_version(entity)?))
    }
}
