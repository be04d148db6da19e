//! Per-key comparison of two attribute maps.
//!
//! A key missing from one side compares as `null`, so `{}` and `{"a": null}`
//! are equal here. The side itself still remembers whether the key existed,
//! which lets strategies restore the exact original map on reverse apply.

use std::collections::BTreeMap;

use rvl_types::Attributes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

static NULL: Value = Value::Null;

/// Old and new value of a single attribute. `None` means the key was absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub old: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub new: Option<Value>,
}

/// How an attribute changed, comparing absent keys as `null`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Old value was null, new value is not.
    Set,
    /// Old value was not null, new value is.
    Cleared,
    /// Both values are non-null and differ.
    Changed,
}

impl FieldChange {
    pub fn new(old: Option<Value>, new: Option<Value>) -> Self {
        Self { old, new }
    }

    /// Old value, `null` when the key was absent.
    pub fn old_value(&self) -> &Value {
        self.old.as_ref().unwrap_or(&NULL)
    }

    /// New value, `null` when the key is absent.
    pub fn new_value(&self) -> &Value {
        self.new.as_ref().unwrap_or(&NULL)
    }

    /// Returns `true` if the two sides differ under null-absent comparison.
    pub fn is_change(&self) -> bool {
        self.old_value() != self.new_value()
    }

    /// Classify the change, or `None` when the sides compare equal.
    pub fn kind(&self) -> Option<ChangeKind> {
        match (self.old_value(), self.new_value()) {
            (old, new) if old == new => None,
            (Value::Null, _) => Some(ChangeKind::Set),
            (_, Value::Null) => Some(ChangeKind::Cleared),
            _ => Some(ChangeKind::Changed),
        }
    }

    /// The side a forward (`reverse == false`) or reverse apply writes.
    pub fn target(&self, reverse: bool) -> Option<&Value> {
        if reverse {
            self.old.as_ref()
        } else {
            self.new.as_ref()
        }
    }
}

/// Keys whose values differ between `old` and `new`, with both sides.
///
/// Structured values (arrays, objects) compare by value.
pub fn changed_fields(old: &Attributes, new: &Attributes) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();

    for (key, old_val) in old {
        let new_val = new.get(key);
        if old_val != new_val.unwrap_or(&NULL) {
            changes.insert(
                key.clone(),
                FieldChange::new(Some(old_val.clone()), new_val.cloned()),
            );
        }
    }

    for (key, new_val) in new {
        if !old.contains_key(key) && !new_val.is_null() {
            changes.insert(key.clone(), FieldChange::new(None, Some(new_val.clone())));
        }
    }

    changes
}

/// Writes `target` for `key`, removing the key when the target side was absent.
pub(crate) fn write_side(state: &mut Attributes, key: &str, target: Option<&Value>) {
    match target {
        Some(value) => {
            state.insert(key.to_string(), value.clone());
        }
        None => {
            state.remove(key);
        }
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
