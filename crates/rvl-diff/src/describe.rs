use std::collections::BTreeMap;

use serde_json::Value;

use crate::changes::{ChangeKind, FieldChange};

/// Render per-key changes as short human-readable sentences.
///
/// Entries whose sides compare equal are skipped.
pub fn describe_changes(changes: &BTreeMap<String, FieldChange>) -> BTreeMap<String, String> {
    changes
        .iter()
        .filter_map(|(key, change)| {
            let text = match change.kind()? {
                ChangeKind::Set => format!("set to {}", render(change.new_value())),
                ChangeKind::Cleared => format!("cleared (was {})", render(change.old_value())),
                ChangeKind::Changed => format!(
                    "changed from {} to {}",
                    render(change.old_value()),
                    render(change.new_value())
                ),
            };
            Some((key.clone(), text))
        })
        .collect()
}

fn render(value: &Value) -> String {
    const MAX_CHARS: usize = 80;

    let rendered = value.to_string();
    if rendered.chars().count() <= MAX_CHARS {
        return rendered;
    }
    let truncated: String = rendered.chars().take(MAX_CHARS).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(old: Option<Value>, new: Option<Value>) -> FieldChange {
        FieldChange::new(old, new)
    }

    #[test]
    fn classifies_set_cleared_changed() {
        let mut changes = BTreeMap::new();
        changes.insert("title".to_string(), change(Some(json!("Old")), Some(json!("New"))));
        changes.insert("summary".to_string(), change(None, Some(json!("Short"))));
        changes.insert("tags".to_string(), change(Some(json!(["a"])), Some(Value::Null)));

        let described = describe_changes(&changes);
        assert_eq!(described["title"], r#"changed from "Old" to "New""#);
        assert_eq!(described["summary"], r#"set to "Short""#);
        assert_eq!(described["tags"], r#"cleared (was ["a"])"#);
    }

    #[test]
    fn unchanged_keys_are_omitted() {
        let mut changes = BTreeMap::new();
        changes.insert("same".to_string(), change(Some(json!(1)), Some(json!(1))));
        changes.insert("null".to_string(), change(None, Some(Value::Null)));
        assert!(describe_changes(&changes).is_empty());
    }

    #[test]
    fn long_values_are_truncated() {
        let long = "x".repeat(200);
        let mut changes = BTreeMap::new();
        changes.insert("body".to_string(), change(None, Some(json!(long))));
        let described = describe_changes(&changes);
        assert!(described["body"].ends_with("..."));
        assert!(described["body"].len() < 100);
    }
}
