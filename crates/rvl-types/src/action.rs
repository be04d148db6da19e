use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of state transition a revision records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionAction {
    Created,
    Updated,
    Deleted,
    Restored,
    ForceDeleted,
    Reverted,
    StagedApplied,
}

impl RevisionAction {
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Updated,
        Self::Deleted,
        Self::Restored,
        Self::ForceDeleted,
        Self::Reverted,
        Self::StagedApplied,
    ];

    /// Stable persisted name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::ForceDeleted => "force_deleted",
            Self::Reverted => "reverted",
            Self::StagedApplied => "staged_applied",
        }
    }

    /// Returns `true` if the entity no longer exists after this transition.
    pub const fn removes_entity(self) -> bool {
        matches!(self, Self::Deleted | Self::ForceDeleted)
    }
}

impl fmt::Display for RevisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevisionAction {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| TypeError::UnknownAction(s.to_string()))
    }
}
