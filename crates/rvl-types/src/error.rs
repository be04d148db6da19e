use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid reference '{0}': expected 'kind:id'")]
    InvalidRef(String),

    #[error("unknown revision action: {0}")]
    UnknownAction(String),

    #[error("unknown staged change status: {0}")]
    UnknownStatus(String),
}

/// Errors produced by strategy registries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown {kind} strategy: {identifier}")]
    UnknownStrategy { kind: &'static str, identifier: String },

    #[error("{kind} strategy already registered: {identifier}")]
    DuplicateStrategy { kind: &'static str, identifier: String },

    #[error("{kind} strategy identifier must not be blank")]
    BlankIdentifier { kind: &'static str },

    #[error("{kind} registry lock poisoned")]
    Poisoned { kind: &'static str },
}
