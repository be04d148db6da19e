use std::collections::BTreeMap;

use rvl_types::{Attributes, Strategy};
use serde_json::Value;

use crate::changes::{changed_fields, write_side, FieldChange};
use crate::error::{DiffError, DiffResult};
use crate::payload::DiffPayload;
use crate::strategy::DiffStrategy;

/// Stores only differing keys: `{"key": {"old": .., "new": ..}}`.
///
/// A side is omitted when the key was absent on that side, so a reverse apply
/// removes keys the change introduced instead of leaving them as `null`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttributeDiff;

impl AttributeDiff {
    pub const IDENTIFIER: &'static str = "attribute";
}

fn parse(diff: &DiffPayload) -> DiffResult<BTreeMap<String, FieldChange>> {
    match diff.as_value() {
        Value::Object(_) => serde_json::from_value(diff.as_value().clone())
            .map_err(|e| DiffError::malformed(AttributeDiff::IDENTIFIER, e)),
        other => Err(DiffError::malformed(
            AttributeDiff::IDENTIFIER,
            format!("expected an object, found {other}"),
        )),
    }
}

impl Strategy for AttributeDiff {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }
}

impl DiffStrategy for AttributeDiff {
    fn calculate(&self, old: &Attributes, new: &Attributes) -> DiffPayload {
        let payload = changed_fields(old, new)
            .into_iter()
            .map(|(key, change)| {
                let mut sides = serde_json::Map::new();
                if let Some(old) = change.old {
                    sides.insert("old".into(), old);
                }
                if let Some(new) = change.new {
                    sides.insert("new".into(), new);
                }
                (key, Value::Object(sides))
            })
            .collect();
        DiffPayload::new(Value::Object(payload))
    }

    fn apply(
        &self,
        current: &Attributes,
        diff: &DiffPayload,
        reverse: bool,
    ) -> DiffResult<Attributes> {
        let mut state = current.clone();
        for (key, change) in parse(diff)? {
            write_side(&mut state, &key, change.target(reverse));
        }
        Ok(state)
    }

    fn changes(&self, diff: &DiffPayload) -> DiffResult<BTreeMap<String, FieldChange>> {
        Ok(parse(diff)?
            .into_iter()
            .filter(|(_, change)| change.is_change())
            .collect())
    }
}
