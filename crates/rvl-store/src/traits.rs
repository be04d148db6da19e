use rvl_types::{Attributes, EntityRef};

use crate::error::StoreResult;

/// Attribute storage for tracked entities.
///
/// Implementations must be thread-safe. Each call is treated as one
/// synchronous, fallible round trip; the core holds no transaction open
/// across calls.
pub trait EntityStore: Send + Sync {
    /// Current attribute values of an entity.
    ///
    /// Returns `Err(StoreError::NotFound)` if the entity does not exist.
    fn attributes(&self, entity: &EntityRef) -> StoreResult<Attributes>;

    /// Replace the attribute values of an existing entity.
    fn set_attributes(&self, entity: &EntityRef, attributes: &Attributes) -> StoreResult<()>;

    /// Create a new entity with the given attributes.
    fn insert(&self, entity: &EntityRef, attributes: &Attributes) -> StoreResult<()>;

    /// Remove an entity. Returns `true` if it existed.
    fn remove(&self, entity: &EntityRef) -> StoreResult<bool>;

    /// Check whether the entity exists.
    fn exists(&self, entity: &EntityRef) -> StoreResult<bool>;
}
