use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rvl_diff::DiffPayload;
use rvl_types::{ActorRef, EntityRef, RevisionAction, RevisionId};
use serde::Serialize;
use serde_json::Value;

use crate::error::{LedgerError, LedgerResult};
use crate::records::Revision;

const DOMAIN: &[u8] = b"rvl-revision-v1:";

/// Every field of a revision except the checksum itself.
#[derive(Serialize)]
struct ChecksumView<'a> {
    id: &'a RevisionId,
    entity: &'a EntityRef,
    version: u32,
    action: RevisionAction,
    diff_strategy: &'a str,
    payload: &'a DiffPayload,
    causer: &'a Option<ActorRef>,
    metadata: &'a BTreeMap<String, Value>,
    created_at: &'a DateTime<Utc>,
}

/// Domain-separated BLAKE3 digest of a revision's content, hex-encoded.
pub fn revision_checksum(revision: &Revision) -> LedgerResult<String> {
    let view = ChecksumView {
        id: &revision.id,
        entity: &revision.entity,
        version: revision.version,
        action: revision.action,
        diff_strategy: &revision.diff_strategy,
        payload: &revision.payload,
        causer: &revision.causer,
        metadata: &revision.metadata,
        created_at: &revision.created_at,
    };
    let encoded =
        serde_json::to_vec(&view).map_err(|e| LedgerError::Serialization(e.to_string()))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN);
    hasher.update(&encoded);
    Ok(hex::encode(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn revision() -> Revision {
        let mut revision = Revision {
            id: RevisionId::new(),
            entity: EntityRef::new("post", "1"),
            version: 1,
            action: RevisionAction::Created,
            diff_strategy: "attribute".into(),
            payload: DiffPayload::new(json!({"title": {"new": "A"}})),
            causer: None,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            checksum: String::new(),
        };
        revision.checksum = revision_checksum(&revision).unwrap();
        revision
    }

    #[test]
    fn checksum_is_deterministic_hex() {
        let revision = revision();
        assert_eq!(revision.checksum.len(), 64);
        assert_eq!(revision_checksum(&revision).unwrap(), revision.checksum);
        assert!(revision.verify_checksum().unwrap());
    }

    #[test]
    fn checksum_ignores_stored_checksum_field() {
        let mut revision = revision();
        let original = revision.checksum.clone();
        revision.checksum = "tampered".into();
        assert_eq!(revision_checksum(&revision).unwrap(), original);
        assert!(!revision.verify_checksum().unwrap());
    }

    #[test]
    fn payload_changes_alter_checksum() {
        let mut revision = revision();
        revision.payload = DiffPayload::new(json!({"title": {"new": "B"}}));
        assert!(!revision.verify_checksum().unwrap());
    }
}
