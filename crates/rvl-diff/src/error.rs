//! Error types for the diff crate.

/// Errors that can occur while interpreting a diff payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// The payload does not have the shape the strategy produces. This only
    /// happens when a payload is handed to a strategy other than the one that
    /// calculated it, or when stored data was altered.
    #[error("malformed {strategy} payload: {reason}")]
    MalformedPayload { strategy: String, reason: String },
}

impl DiffError {
    pub fn malformed(strategy: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            strategy: strategy.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
