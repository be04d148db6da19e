use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rvl_types::{EntityRef, StagedChangeId};

use crate::error::{ApprovalError, ApprovalResult};
use crate::records::StagedChange;
use crate::traits::StagedChangeStore;

/// In-memory staged change store. The write lock makes each
/// compare-and-swap atomic.
#[derive(Debug, Default)]
pub struct InMemoryStagedChangeStore {
    changes: RwLock<HashMap<StagedChangeId, StagedChange>>,
}

impl InMemoryStagedChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> ApprovalResult<RwLockReadGuard<'_, HashMap<StagedChangeId, StagedChange>>> {
        self.changes
            .read()
            .map_err(|e| ApprovalError::Storage(format!("lock poisoned: {e}")))
    }

    fn write(
        &self,
    ) -> ApprovalResult<RwLockWriteGuard<'_, HashMap<StagedChangeId, StagedChange>>> {
        self.changes
            .write()
            .map_err(|e| ApprovalError::Storage(format!("lock poisoned: {e}")))
    }
}

impl StagedChangeStore for InMemoryStagedChangeStore {
    fn insert(&self, change: &StagedChange) -> ApprovalResult<()> {
        let mut changes = self.write()?;
        if changes.contains_key(&change.id) {
            return Err(ApprovalError::AlreadyExists(change.id));
        }
        changes.insert(change.id, change.clone());
        Ok(())
    }

    fn get(&self, id: &StagedChangeId) -> ApprovalResult<Option<StagedChange>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn compare_and_swap(
        &self,
        expected_lock_version: u64,
        updated: &StagedChange,
    ) -> ApprovalResult<bool> {
        let mut changes = self.write()?;
        let stored = changes
            .get_mut(&updated.id)
            .ok_or(ApprovalError::NotFound(updated.id))?;
        if stored.lock_version != expected_lock_version {
            return Ok(false);
        }
        *stored = StagedChange {
            lock_version: expected_lock_version + 1,
            ..updated.clone()
        };
        Ok(true)
    }

    fn for_entity(&self, entity: &EntityRef) -> ApprovalResult<Vec<StagedChange>> {
        let mut found: Vec<_> = self
            .read()?
            .values()
            .filter(|change| &change.entity == entity)
            .cloned()
            .collect();
        found.sort_by_key(|change| (change.created_at, change.id));
        Ok(found)
    }
}
