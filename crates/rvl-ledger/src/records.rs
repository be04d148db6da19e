use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rvl_diff::{describe_changes, DiffPayload, FieldChange};
use rvl_types::{ActorRef, Attributes, EntityRef, RevisionAction, RevisionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::revision_checksum;
use crate::error::LedgerResult;

/// Metadata key written on `Reverted` revisions.
pub const REVERTED_TO_VERSION: &str = "reverted_to_version";

/// Immutable record of one state transition of an entity.
///
/// `payload` is only meaningful to the strategy named by `diff_strategy`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub entity: EntityRef,
    pub version: u32,
    pub action: RevisionAction,
    pub diff_strategy: String,
    pub payload: DiffPayload,
    pub causer: Option<ActorRef>,
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    /// Hex BLAKE3 digest over every other field.
    pub checksum: String,
}

impl Revision {
    /// Recompute the checksum and compare it with the stored one.
    pub fn verify_checksum(&self) -> LedgerResult<bool> {
        Ok(revision_checksum(self)? == self.checksum)
    }

    /// Metadata value for `key`, if present.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// The version a `Reverted` revision restored, if this is one.
    pub fn reverted_to(&self) -> Option<u32> {
        self.meta(REVERTED_TO_VERSION)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }
}

/// Input for [`crate::RevisionLedger::append`].
#[derive(Clone, Debug)]
pub struct RevisionInput {
    pub entity: EntityRef,
    pub action: RevisionAction,
    pub old_values: Attributes,
    pub new_values: Attributes,
    /// Identifier of the diff strategy that encodes the payload.
    pub diff_strategy: String,
    pub causer: Option<ActorRef>,
    pub metadata: BTreeMap<String, Value>,
}

impl RevisionInput {
    pub fn new(
        entity: EntityRef,
        action: RevisionAction,
        old_values: Attributes,
        new_values: Attributes,
        diff_strategy: impl Into<String>,
    ) -> Self {
        Self {
            entity,
            action,
            old_values,
            new_values,
            diff_strategy: diff_strategy.into(),
            causer: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn caused_by(mut self, causer: Option<ActorRef>) -> Self {
        self.causer = causer;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Decoded per-key view of one revision's payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevisionChanges {
    changes: BTreeMap<String, FieldChange>,
}

impl RevisionChanges {
    pub fn new(changes: BTreeMap<String, FieldChange>) -> Self {
        Self { changes }
    }

    /// Value before the revision; `None` when the key was absent or unchanged.
    pub fn old_value(&self, key: &str) -> Option<&Value> {
        self.changes.get(key).and_then(|c| c.old.as_ref())
    }

    /// Value after the revision; `None` when the key is absent or unchanged.
    pub fn new_value(&self, key: &str) -> Option<&Value> {
        self.changes.get(key).and_then(|c| c.new.as_ref())
    }

    /// Like [`Self::old_value`] with an explicit fallback for a missing key.
    pub fn old_value_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.old_value(key).unwrap_or(default)
    }

    /// Like [`Self::new_value`] with an explicit fallback for a missing key.
    pub fn new_value_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.new_value(key).unwrap_or(default)
    }

    pub fn changed_keys(&self) -> Vec<&str> {
        self.changes.keys().map(String::as_str).collect()
    }

    pub fn was_changed(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn describe(&self) -> BTreeMap<String, String> {
        describe_changes(&self.changes)
    }

    pub fn as_map(&self) -> &BTreeMap<String, FieldChange> {
        &self.changes
    }
}
