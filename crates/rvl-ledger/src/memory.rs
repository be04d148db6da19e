use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rvl_store::StoreError;
use rvl_types::{EntityRef, RevisionId};

use crate::error::{LedgerError, LedgerResult};
use crate::records::Revision;
use crate::traits::RevisionStore;

/// In-memory revision store for tests, local demos, and embedding.
#[derive(Default)]
pub struct InMemoryRevisionStore {
    inner: RwLock<RevisionState>,
}

#[derive(Default)]
struct RevisionState {
    streams: HashMap<EntityRef, Vec<Revision>>,
    id_index: HashMap<RevisionId, (EntityRef, usize)>,
}

impl InMemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_state(&self) -> LedgerResult<RwLockReadGuard<'_, RevisionState>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Persist(format!("revision store lock poisoned: {e}")).into())
    }

    fn write_state(&self) -> LedgerResult<RwLockWriteGuard<'_, RevisionState>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Persist(format!("revision store lock poisoned: {e}")).into())
    }
}

impl RevisionStore for InMemoryRevisionStore {
    fn insert(&self, revision: &Revision) -> LedgerResult<()> {
        let mut state = self.write_state()?;
        if state.id_index.contains_key(&revision.id) {
            return Err(LedgerError::IntegrityViolation {
                version: revision.version,
                reason: format!("duplicate revision id {}", revision.id),
            });
        }

        let expected = state.streams.get(&revision.entity).map_or(0, Vec::len) + 1;
        if revision.version as usize != expected {
            return Err(LedgerError::VersionConflict {
                entity: revision.entity.clone(),
                version: revision.version,
            });
        }

        let stream = state.streams.entry(revision.entity.clone()).or_default();
        stream.push(revision.clone());
        let index = stream.len() - 1;
        state
            .id_index
            .insert(revision.id, (revision.entity.clone(), index));
        Ok(())
    }

    fn latest_version(&self, entity: &EntityRef) -> LedgerResult<u32> {
        let state = self.read_state()?;
        Ok(state
            .streams
            .get(entity)
            .and_then(|stream| stream.last())
            .map(|revision| revision.version)
            .unwrap_or(0))
    }

    fn get(&self, entity: &EntityRef, version: u32) -> LedgerResult<Option<Revision>> {
        if version == 0 {
            return Ok(None);
        }
        let state = self.read_state()?;
        Ok(state
            .streams
            .get(entity)
            .and_then(|stream| stream.get(version as usize - 1))
            .cloned())
    }

    fn get_by_id(&self, id: &RevisionId) -> LedgerResult<Option<Revision>> {
        let state = self.read_state()?;
        let Some((entity, index)) = state.id_index.get(id) else {
            return Ok(None);
        };
        Ok(state
            .streams
            .get(entity)
            .and_then(|stream| stream.get(*index))
            .cloned())
    }

    fn read_range(&self, entity: &EntityRef, from: u32, to: u32) -> LedgerResult<Vec<Revision>> {
        if from == 0 || from > to {
            return Ok(vec![]);
        }
        let state = self.read_state()?;
        let Some(stream) = state.streams.get(entity) else {
            return Ok(vec![]);
        };

        let start = from as usize - 1;
        if start >= stream.len() {
            return Ok(vec![]);
        }
        let end_exclusive = (to as usize).min(stream.len());
        Ok(stream[start..end_exclusive].to_vec())
    }

    fn read_all(&self, entity: &EntityRef) -> LedgerResult<Vec<Revision>> {
        let state = self.read_state()?;
        Ok(state.streams.get(entity).cloned().unwrap_or_default())
    }

    fn entities(&self) -> LedgerResult<Vec<EntityRef>> {
        let state = self.read_state()?;
        let mut entities: Vec<_> = state.streams.keys().cloned().collect();
        entities.sort();
        Ok(entities)
    }

    fn count(&self, entity: &EntityRef) -> LedgerResult<u64> {
        let state = self.read_state()?;
        Ok(state
            .streams
            .get(entity)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }
}

impl std::fmt::Debug for InMemoryRevisionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let streams = self.inner.read().map(|s| s.streams.len()).unwrap_or(0);
        f.debug_struct("InMemoryRevisionStore")
            .field("entity_count", &streams)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use rvl_diff::{default_diff_registry, DiffPayload};
    use rvl_types::RevisionAction;
    use serde_json::json;

    use super::*;
    use crate::checksum::revision_checksum;
    use crate::validation::{HistoryValidator, ViolationKind};

    fn post(id: &str) -> EntityRef {
        EntityRef::new("post", id)
    }

    fn revision(entity: &EntityRef, version: u32, title: &str) -> Revision {
        let mut revision = Revision {
            id: RevisionId::new(),
            entity: entity.clone(),
            version,
            action: RevisionAction::Updated,
            diff_strategy: "attribute".into(),
            payload: DiffPayload::new(json!({"title": {"new": title}})),
            causer: None,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            checksum: String::new(),
        };
        revision.checksum = revision_checksum(&revision).unwrap();
        revision
    }

    #[test]
    fn insert_requires_next_version() {
        let store = InMemoryRevisionStore::new();
        let entity = post("1");

        store.insert(&revision(&entity, 1, "a")).unwrap();
        let error = store.insert(&revision(&entity, 1, "b")).unwrap_err();
        assert_eq!(
            error,
            LedgerError::VersionConflict {
                entity: entity.clone(),
                version: 1
            }
        );
        assert!(error.is_retryable());

        let gap = store.insert(&revision(&entity, 3, "c")).unwrap_err();
        assert!(matches!(gap, LedgerError::VersionConflict { version: 3, .. }));
        assert_eq!(store.latest_version(&entity).unwrap(), 1);
    }

    #[test]
    fn duplicate_id_is_an_integrity_violation() {
        let store = InMemoryRevisionStore::new();
        let first = revision(&post("1"), 1, "a");
        store.insert(&first).unwrap();

        let mut copy = first.clone();
        copy.entity = post("2");
        assert!(matches!(
            store.insert(&copy).unwrap_err(),
            LedgerError::IntegrityViolation { .. }
        ));
    }

    #[test]
    fn reads_by_version_id_and_range() {
        let store = InMemoryRevisionStore::new();
        let entity = post("1");
        for (version, title) in [(1, "a"), (2, "b"), (3, "c")] {
            store.insert(&revision(&entity, version, title)).unwrap();
        }

        let second = store.get(&entity, 2).unwrap().unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(store.get_by_id(&second.id).unwrap(), Some(second));
        assert!(store.get(&entity, 0).unwrap().is_none());
        assert!(store.get(&entity, 9).unwrap().is_none());

        let range = store.read_range(&entity, 2, 10).unwrap();
        assert_eq!(range.iter().map(|r| r.version).collect::<Vec<_>>(), vec![2, 3]);
        assert!(store.read_range(&entity, 3, 2).unwrap().is_empty());
        assert_eq!(store.count(&entity).unwrap(), 3);
    }

    #[test]
    fn entities_lists_all_streams() {
        let store = InMemoryRevisionStore::new();
        store.insert(&revision(&post("2"), 1, "a")).unwrap();
        store.insert(&revision(&post("1"), 1, "a")).unwrap();
        assert_eq!(store.entities().unwrap(), vec![post("1"), post("2")]);
        assert_eq!(store.count(&post("404")).unwrap(), 0);
    }

    #[test]
    fn validator_detects_tampering() {
        let store = InMemoryRevisionStore::new();
        let entity = post("1");
        store.insert(&revision(&entity, 1, "a")).unwrap();
        store.insert(&revision(&entity, 2, "b")).unwrap();

        {
            let mut guard = store.inner.write().unwrap();
            let stream = guard.streams.get_mut(&entity).unwrap();
            stream[1].payload = DiffPayload::new(json!({"title": {"new": "forged"}}));
        }

        let report = HistoryValidator::validate(&store, &default_diff_registry(), &entity).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].version, 2);
        assert_eq!(report.violations[0].kind, ViolationKind::ChecksumMismatch);
    }

    #[test]
    fn poisoned_lock_is_a_store_fault() {
        let store = std::sync::Arc::new(InMemoryRevisionStore::new());
        let poisoner = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poison the revision store");
        })
        .join();

        assert!(matches!(
            store.latest_version(&post("1")).unwrap_err(),
            LedgerError::Store(StoreError::Persist(_))
        ));
        assert!(matches!(
            store.insert(&revision(&post("1"), 1, "a")).unwrap_err(),
            LedgerError::Store(StoreError::Persist(_))
        ));
    }
}
