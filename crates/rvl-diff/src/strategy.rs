use std::collections::BTreeMap;
use std::sync::Arc;

use rvl_types::{Attributes, Strategy, StrategyRegistry};

use crate::attribute::AttributeDiff;
use crate::changes::FieldChange;
use crate::describe::describe_changes;
use crate::error::DiffResult;
use crate::payload::DiffPayload;
use crate::snapshot::SnapshotDiff;

/// A pluggable, stateless diff encoding.
///
/// Implementations must satisfy the round-trip law: for every pair of maps
/// `s` and `t`, with `d = calculate(s, t)`,
/// `apply(&apply(s, &d, false)?, &d, true)? == *s`.
/// `apply` must succeed for every payload its own `calculate` produced; it may
/// fail with [`crate::DiffError::MalformedPayload`] for anything else.
pub trait DiffStrategy: Strategy {
    /// Encode the difference between `old` and `new`.
    fn calculate(&self, old: &Attributes, new: &Attributes) -> DiffPayload;

    /// Merge the payload's new side (or old side when `reverse`) onto
    /// `current`. Keys the payload does not mention are left untouched.
    fn apply(
        &self,
        current: &Attributes,
        diff: &DiffPayload,
        reverse: bool,
    ) -> DiffResult<Attributes>;

    /// Per-key old/new view of the payload, restricted to keys that changed.
    fn changes(&self, diff: &DiffPayload) -> DiffResult<BTreeMap<String, FieldChange>>;

    /// Human-readable description per changed key.
    fn describe(&self, diff: &DiffPayload) -> DiffResult<BTreeMap<String, String>> {
        Ok(describe_changes(&self.changes(diff)?))
    }
}

/// Registry of diff strategies keyed by identifier.
pub type DiffRegistry = StrategyRegistry<dyn DiffStrategy>;

/// A registry holding the built-in `snapshot` and `attribute` strategies.
pub fn default_diff_registry() -> DiffRegistry {
    let registry = DiffRegistry::new("diff");
    let builtins: [Arc<dyn DiffStrategy>; 2] = [Arc::new(SnapshotDiff), Arc::new(AttributeDiff)];
    for strategy in builtins {
        // Fresh registry with distinct identifiers: registration cannot collide.
        let _ = registry.register(strategy);
    }
    registry
}
