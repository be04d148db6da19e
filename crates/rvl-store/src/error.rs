use rvl_types::EntityRef;

/// Errors from entity store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested entity does not exist.
    #[error("entity not found: {0}")]
    NotFound(EntityRef),

    /// An entity with this reference already exists.
    #[error("entity already exists: {0}")]
    AlreadyExists(EntityRef),

    /// The backend failed to persist the write.
    #[error("persist error: {0}")]
    Persist(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
