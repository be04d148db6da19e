use std::collections::BTreeMap;

use rvl_types::{Attributes, Strategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::changes::{changed_fields, write_side, FieldChange};
use crate::error::{DiffError, DiffResult};
use crate::payload::DiffPayload;
use crate::strategy::DiffStrategy;

/// Stores both maps verbatim: `{"old": {...}, "new": {...}}`.
///
/// Applying writes every key of the target side and removes keys that only
/// the opposite side holds, so keys mentioned by neither side stay untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotDiff;

impl SnapshotDiff {
    pub const IDENTIFIER: &'static str = "snapshot";
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotPayload {
    #[serde(default)]
    old: Attributes,
    #[serde(default)]
    new: Attributes,
}

impl SnapshotPayload {
    fn parse(diff: &DiffPayload) -> DiffResult<Self> {
        match diff.as_value() {
            Value::Object(_) => serde_json::from_value(diff.as_value().clone())
                .map_err(|e| DiffError::malformed(SnapshotDiff::IDENTIFIER, e)),
            other => Err(DiffError::malformed(
                SnapshotDiff::IDENTIFIER,
                format!("expected an object, found {other}"),
            )),
        }
    }
}

impl Strategy for SnapshotDiff {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }
}

impl DiffStrategy for SnapshotDiff {
    fn calculate(&self, old: &Attributes, new: &Attributes) -> DiffPayload {
        let mut payload = serde_json::Map::new();
        payload.insert("old".into(), Value::Object(old.clone().into_iter().collect()));
        payload.insert("new".into(), Value::Object(new.clone().into_iter().collect()));
        DiffPayload::new(Value::Object(payload))
    }

    fn apply(
        &self,
        current: &Attributes,
        diff: &DiffPayload,
        reverse: bool,
    ) -> DiffResult<Attributes> {
        let payload = SnapshotPayload::parse(diff)?;
        let (target, opposite) = if reverse {
            (&payload.old, &payload.new)
        } else {
            (&payload.new, &payload.old)
        };

        let mut state = current.clone();
        for key in opposite.keys().filter(|key| !target.contains_key(*key)) {
            write_side(&mut state, key, None);
        }
        for (key, value) in target {
            write_side(&mut state, key, Some(value));
        }
        Ok(state)
    }

    fn changes(&self, diff: &DiffPayload) -> DiffResult<BTreeMap<String, FieldChange>> {
        let payload = SnapshotPayload::parse(diff)?;
        Ok(changed_fields(&payload.old, &payload.new))
    }
}
