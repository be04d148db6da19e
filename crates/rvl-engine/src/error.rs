use rvl_approval::ApprovalError;
use rvl_diff::DiffError;
use rvl_ledger::LedgerError;
use rvl_store::StoreError;
use rvl_types::{EntityRef, RegistryError, StagedChangeId, StagedChangeStatus};

/// Errors produced by the engine and the staged change coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// `apply` was called on a staged change that is not `Approved`.
    #[error("staged change {id} is {status}, not approved")]
    NotApproved {
        id: StagedChangeId,
        status: StagedChangeStatus,
    },

    /// The entity a staged change targets no longer exists.
    #[error("target entity not found: {0}")]
    TargetNotFound(EntityRef),

    /// A lifecycle operation does not fit the entity's recorded history.
    #[error("cannot {action} {entity}: {reason}")]
    Lifecycle {
        entity: EntityRef,
        action: &'static str,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl EngineError {
    /// Returns `true` for lost races on a version or status write. Callers
    /// may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Ledger(error) => error.is_retryable(),
            Self::Approval(error) => error.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
