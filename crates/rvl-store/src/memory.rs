use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rvl_types::{Attributes, EntityRef};

use crate::error::{StoreError, StoreResult};
use crate::traits::EntityStore;

/// In-memory, HashMap-based entity store.
///
/// Intended for tests and embedding. Attribute maps are cloned on read and
/// write.
#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<HashMap<EntityRef, Attributes>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities currently stored.
    pub fn len(&self) -> usize {
        self.read().map(|map| map.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<EntityRef, Attributes>>> {
        self.entities
            .read()
            .map_err(|e| StoreError::Persist(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<EntityRef, Attributes>>> {
        self.entities
            .write()
            .map_err(|e| StoreError::Persist(format!("lock poisoned: {e}")))
    }
}

impl EntityStore for InMemoryEntityStore {
    fn attributes(&self, entity: &EntityRef) -> StoreResult<Attributes> {
        self.read()?
            .get(entity)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(entity.clone()))
    }

    fn set_attributes(&self, entity: &EntityRef, attributes: &Attributes) -> StoreResult<()> {
        let mut map = self.write()?;
        let slot = map
            .get_mut(entity)
            .ok_or_else(|| StoreError::NotFound(entity.clone()))?;
        *slot = attributes.clone();
        tracing::trace!(%entity, keys = attributes.len(), "entity attributes written");
        Ok(())
    }

    fn insert(&self, entity: &EntityRef, attributes: &Attributes) -> StoreResult<()> {
        let mut map = self.write()?;
        if map.contains_key(entity) {
            return Err(StoreError::AlreadyExists(entity.clone()));
        }
        map.insert(entity.clone(), attributes.clone());
        Ok(())
    }

    fn remove(&self, entity: &EntityRef) -> StoreResult<bool> {
        Ok(self.write()?.remove(entity).is_some())
    }

    fn exists(&self, entity: &EntityRef) -> StoreResult<bool> {
        Ok(self.read()?.contains_key(entity))
    }
}

impl std::fmt::Debug for InMemoryEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEntityStore")
            .field("entity_count", &self.len())
            .finish()
    }
}
