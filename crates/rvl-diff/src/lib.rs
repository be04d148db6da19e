//! Diff strategies for the revision ledger.
//!
//! A diff strategy encodes the difference between two attribute maps into an
//! opaque [`DiffPayload`], applies a payload forward or in reverse, and
//! describes it for humans. Every stored payload is tagged with the identifier
//! of the strategy that produced it; payloads are only ever interpreted by that
//! same strategy, so histories may mix strategies over time.
//!
//! # Key Types
//!
//! - [`DiffStrategy`] -- the strategy contract
//! - [`SnapshotDiff`] -- stores the full old and new maps
//! - [`AttributeDiff`] -- stores only the keys whose values differ
//! - [`FieldChange`] / [`changed_fields`] -- per-key old/new comparison

pub mod attribute;
pub mod changes;
pub mod describe;
pub mod error;
pub mod payload;
pub mod snapshot;
pub mod strategy;

pub use attribute::AttributeDiff;
pub use changes::{changed_fields, ChangeKind, FieldChange};
pub use describe::describe_changes;
pub use error::{DiffError, DiffResult};
pub use payload::DiffPayload;
pub use snapshot::SnapshotDiff;
pub use strategy::{default_diff_registry, DiffRegistry, DiffStrategy};

#[cfg(test)]
mod testing;
