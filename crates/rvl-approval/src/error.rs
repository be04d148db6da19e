use rvl_diff::DiffError;
use rvl_types::{ActorRef, RegistryError, StagedChangeId, StagedChangeStatus};

/// Errors produced by staged change and approval operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("staged change not found: {0}")]
    NotFound(StagedChangeId),

    #[error("staged change already exists: {0}")]
    AlreadyExists(StagedChangeId),

    /// The operation is not allowed from the current status. Checked before
    /// anything is mutated.
    #[error("cannot {action} a staged change that is {status}")]
    InvalidTransition {
        status: StagedChangeStatus,
        action: &'static str,
    },

    #[error("staged change is already {0}")]
    AlreadyTerminal(StagedChangeStatus),

    #[error("{voter} has already voted on this staged change")]
    DuplicateVote { voter: ActorRef },

    #[error("{strategy} approval requires an identified voter")]
    AnonymousVoter { strategy: String },

    /// Another writer changed the staged change's status or votes between
    /// read and write. Retryable.
    #[error("staged change {0} was modified concurrently")]
    StatusConflict(StagedChangeId),

    #[error("unknown approval strategy: {0}")]
    UnknownApprovalStrategy(String),

    #[error("registry error: {0}")]
    Registry(RegistryError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ApprovalError {
    /// Returns `true` if repeating the whole read-decide-write sequence may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StatusConflict(_))
    }
}

impl From<RegistryError> for ApprovalError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::UnknownStrategy {
                kind: "approval",
                identifier,
            } => Self::UnknownApprovalStrategy(identifier),
            other => Self::Registry(other),
        }
    }
}

/// Convenience alias for approval results.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
