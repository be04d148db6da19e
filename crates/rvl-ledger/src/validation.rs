use rvl_diff::DiffRegistry;
use rvl_types::EntityRef;

use crate::checksum::revision_checksum;
use crate::error::LedgerResult;
use crate::traits::RevisionStore;

/// Result of validating one entity's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryReport {
    pub entity: EntityRef,
    pub revision_count: u64,
    pub violations: Vec<Violation>,
}

impl HistoryReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub version: u32,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    VersionGap,
    ForeignEntity,
    ChecksumMismatch,
    UnknownStrategy,
    UnreadablePayload,
}

/// History integrity validator.
pub struct HistoryValidator;

impl HistoryValidator {
    /// Check version contiguity, checksums, and that every payload can be
    /// decoded by the strategy it names.
    pub fn validate<R: RevisionStore + ?Sized>(
        store: &R,
        diffs: &DiffRegistry,
        entity: &EntityRef,
    ) -> LedgerResult<HistoryReport> {
        let history = store.read_all(entity)?;
        let mut violations = Vec::new();

        for (index, revision) in history.iter().enumerate() {
            let expected = index as u32 + 1;
            if revision.version != expected {
                violations.push(Violation {
                    version: revision.version,
                    kind: ViolationKind::VersionGap,
                    description: format!("expected version {expected}, got {}", revision.version),
                });
            }

            if &revision.entity != entity {
                violations.push(Violation {
                    version: revision.version,
                    kind: ViolationKind::ForeignEntity,
                    description: format!("revision belongs to {}", revision.entity),
                });
            }

            if revision_checksum(revision)? != revision.checksum {
                violations.push(Violation {
                    version: revision.version,
                    kind: ViolationKind::ChecksumMismatch,
                    description: "stored checksum does not match computed".into(),
                });
            }

            match diffs.resolve(&revision.diff_strategy) {
                Ok(strategy) => {
                    if let Err(error) = strategy.changes(&revision.payload) {
                        violations.push(Violation {
                            version: revision.version,
                            kind: ViolationKind::UnreadablePayload,
                            description: error.to_string(),
                        });
                    }
                }
                Err(_) => violations.push(Violation {
                    version: revision.version,
                    kind: ViolationKind::UnknownStrategy,
                    description: format!("diff strategy '{}' is not registered", revision.diff_strategy),
                }),
            }
        }

        Ok(HistoryReport {
            entity: entity.clone(),
            revision_count: history.len() as u64,
            violations,
        })
    }

    /// Validate every entity with history in the store.
    pub fn validate_all<R: RevisionStore + ?Sized>(
        store: &R,
        diffs: &DiffRegistry,
    ) -> LedgerResult<Vec<HistoryReport>> {
        store
            .entities()?
            .iter()
            .map(|entity| Self::validate(store, diffs, entity))
            .collect()
    }
}
