use rvl_diff::DiffError;
use rvl_store::StoreError;
use rvl_types::{EntityRef, RegistryError};

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("revision {version} not found for {entity}")]
    RevisionNotFound { entity: EntityRef, version: u32 },

    /// A payload names a diff strategy that is not registered. History written
    /// with that strategy cannot be interpreted until it is registered again.
    #[error("unknown diff strategy: {0}")]
    UnknownDiffStrategy(String),

    /// Another writer claimed this version first. Retryable.
    #[error("version {version} of {entity} was claimed concurrently")]
    VersionConflict { entity: EntityRef, version: u32 },

    #[error("cannot interpret payload of revision {version}: {source}")]
    Payload { version: u32, source: DiffError },

    #[error("integrity violation at version {version}: {reason}")]
    IntegrityViolation { version: u32, reason: String },

    #[error("registry error: {0}")]
    Registry(RegistryError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    /// Returns `true` if repeating the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<RegistryError> for LedgerError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::UnknownStrategy { identifier, .. } => {
                Self::UnknownDiffStrategy(identifier)
            }
            other => Self::Registry(other),
        }
    }
}

/// Convenience alias for ledger results.
pub type LedgerResult<T> = Result<T, LedgerError>;
