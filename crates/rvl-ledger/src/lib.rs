//! Append-only revision ledger for the revision ledger (RVL).
//!
//! This crate is the heart of RVL. It provides:
//! - The immutable [`Revision`] record with a BLAKE3 checksum
//! - The [`RevisionStore`] boundary and [`InMemoryRevisionStore`]
//! - [`RevisionLedger`]: versioned append, lookups, `between`, forward
//!   replay (`reconstruct_at`) and reverse undo (`revert_to`)
//! - [`TrackingRegistry`] with the RAII [`TrackingGuard`]
//! - History validation (version contiguity, checksums, strategy coverage)

pub mod checksum;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod records;
pub mod replay;
pub mod tracking;
pub mod traits;
pub mod validation;

pub use checksum::revision_checksum;
pub use error::{LedgerError, LedgerResult};
pub use ledger::{RevisionLedger, DEFAULT_MAX_APPEND_ATTEMPTS};
pub use memory::InMemoryRevisionStore;
pub use records::{Revision, RevisionChanges, RevisionInput, REVERTED_TO_VERSION};
pub use replay::{ReplayEngine, ReplayResult};
pub use tracking::{TrackingGuard, TrackingRegistry};
pub use traits::RevisionStore;
pub use validation::{HistoryReport, HistoryValidator, Violation, ViolationKind};
