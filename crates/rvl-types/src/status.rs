use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle state of a staged change.
///
/// ```text
/// Pending --approve--> Approved --apply--> Applied
///    |  \--reject---> Rejected
///    \----cancel----> Cancelled   (also from Approved)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedChangeStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    Cancelled,
}

impl StagedChangeStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Applied,
        Self::Cancelled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::Cancelled => "cancelled",
        }
    }

    /// Proposed values may only change while pending.
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Votes are only accepted while pending.
    pub const fn is_open_for_votes(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn can_be_applied(self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Terminal states are immutable.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Applied | Self::Cancelled)
    }
}

impl fmt::Display for StagedChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StagedChangeStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypeError::UnknownStatus(s.to_string()))
    }
}
