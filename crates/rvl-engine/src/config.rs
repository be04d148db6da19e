use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rvl_approval::{QuorumThresholds, SingleApproval};
use rvl_diff::AttributeDiff;
use rvl_types::Attributes;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Process-wide engine configuration with per-entity-type overrides.
///
/// ```toml
/// default_diff_strategy = "attribute"
/// default_approval_strategy = "single"
/// events_enabled = true
///
/// [quorum]
/// approvals_required = 2
/// rejections_required = 1
///
/// [entity_types.post]
/// approval_strategy = "quorum"
/// blocked_attributes = ["view_count"]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_diff_strategy: String,
    pub default_approval_strategy: String,
    /// Thresholds used by the quorum strategy when neither the staged change
    /// nor its entity type sets its own.
    pub quorum: QuorumThresholds,
    pub events_enabled: bool,
    /// Overrides keyed by `EntityRef::kind`.
    pub entity_types: BTreeMap<String, EntityTypeConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_diff_strategy: AttributeDiff::IDENTIFIER.to_string(),
            default_approval_strategy: SingleApproval::IDENTIFIER.to_string(),
            quorum: QuorumThresholds::default(),
            events_enabled: true,
            entity_types: BTreeMap::new(),
        }
    }
}

/// Overrides for one entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityTypeConfig {
    pub diff_strategy: Option<String>,
    pub approval_strategy: Option<String>,
    /// When set, only these keys may be staged or recorded.
    pub allowed_attributes: Option<BTreeSet<String>>,
    /// Never staged or recorded.
    pub blocked_attributes: BTreeSet<String>,
    /// Whether lifecycle writes and applied staged changes append revisions.
    pub tracked: bool,
    pub quorum: Option<QuorumThresholds>,
}

impl Default for EntityTypeConfig {
    fn default() -> Self {
        Self {
            diff_strategy: None,
            approval_strategy: None,
            allowed_attributes: None,
            blocked_attributes: BTreeSet::new(),
            tracked: true,
            quorum: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EngineError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Reject contradictory settings. Strategy identifiers are checked
    /// against the registries when the engine is built.
    pub fn validate(&self) -> EngineResult<()> {
        if self.default_diff_strategy.trim().is_empty()
            || self.default_approval_strategy.trim().is_empty()
        {
            return Err(EngineError::Config("default strategies must not be blank".into()));
        }
        check_quorum("quorum", &self.quorum)?;

        for (kind, overrides) in &self.entity_types {
            if let Some(quorum) = &overrides.quorum {
                check_quorum(&format!("entity_types.{kind}.quorum"), quorum)?;
            }
            if let Some(allowed) = &overrides.allowed_attributes {
                if let Some(key) = allowed.intersection(&overrides.blocked_attributes).next() {
                    return Err(EngineError::Config(format!(
                        "entity_types.{kind}: attribute '{key}' is both allowed and blocked"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn entity_type(&self, kind: &str) -> Option<&EntityTypeConfig> {
        self.entity_types.get(kind)
    }

    pub fn diff_strategy_for(&self, kind: &str) -> &str {
        self.entity_type(kind)
            .and_then(|t| t.diff_strategy.as_deref())
            .unwrap_or(&self.default_diff_strategy)
    }

    pub fn approval_strategy_for(&self, kind: &str) -> &str {
        self.entity_type(kind)
            .and_then(|t| t.approval_strategy.as_deref())
            .unwrap_or(&self.default_approval_strategy)
    }

    pub fn is_tracked(&self, kind: &str) -> bool {
        self.entity_type(kind).map_or(true, |t| t.tracked)
    }

    /// Per-type quorum thresholds, if the type overrides the global ones.
    pub fn quorum_override(&self, kind: &str) -> Option<QuorumThresholds> {
        self.entity_type(kind).and_then(|t| t.quorum)
    }

    pub fn is_attribute_allowed(&self, kind: &str, key: &str) -> bool {
        match self.entity_type(kind) {
            Some(t) => {
                !t.blocked_attributes.contains(key)
                    && t.allowed_attributes
                        .as_ref()
                        .map_or(true, |allowed| allowed.contains(key))
            }
            None => true,
        }
    }

    /// Drop every key the entity type does not allow.
    pub fn filter_attributes(&self, kind: &str, attributes: &Attributes) -> Attributes {
        attributes
            .iter()
            .filter(|(key, _)| self.is_attribute_allowed(kind, key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Every strategy identifier the configuration refers to.
    pub(crate) fn referenced_strategies(&self) -> (BTreeSet<&str>, BTreeSet<&str>) {
        let mut diffs = BTreeSet::from([self.default_diff_strategy.as_str()]);
        let mut approvals = BTreeSet::from([self.default_approval_strategy.as_str()]);
        for overrides in self.entity_types.values() {
            diffs.extend(overrides.diff_strategy.as_deref());
            approvals.extend(overrides.approval_strategy.as_deref());
        }
        (diffs, approvals)
    }
}

fn check_quorum(path: &str, quorum: &QuorumThresholds) -> EngineResult<()> {
    if quorum.approvals_required == 0 || quorum.rejections_required == 0 {
        return Err(EngineError::Config(format!("{path}: thresholds must be at least 1")));
    }
    Ok(())
}
