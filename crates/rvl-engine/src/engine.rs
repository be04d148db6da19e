use std::collections::BTreeMap;
use std::sync::Arc;

use rvl_approval::{
    default_approval_registry, ApprovalRegistry, ApprovalStatus, InMemoryStagedChangeStore,
    StagedChange, StagedChangeStore,
};
use rvl_diff::{changed_fields, default_diff_registry, DiffRegistry, FieldChange};
use rvl_ledger::{InMemoryRevisionStore, Revision, RevisionInput, RevisionLedger, RevisionStore};
use rvl_store::{EntityStore, InMemoryEntityStore};
use rvl_types::{ActorResolver, ActorRef, Attributes, EntityRef, RevisionAction, StagedChangeId, SystemActor};

use crate::config::EngineConfig;
use crate::coordinator::{AppliedChange, StagedChangeCoordinator};
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventBus, EventSink};

/// Assembles an [`Engine`]. Every collaborator not supplied falls back to
/// its in-memory or built-in default.
pub struct EngineBuilder {
    config: EngineConfig,
    entities: Option<Arc<dyn EntityStore>>,
    revisions: Option<Arc<dyn RevisionStore>>,
    changes: Option<Arc<dyn StagedChangeStore>>,
    diffs: Option<Arc<DiffRegistry>>,
    approvals: Option<Arc<ApprovalRegistry>>,
    actors: Arc<dyn ActorResolver>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            entities: None,
            revisions: None,
            changes: None,
            diffs: None,
            approvals: None,
            actors: Arc::new(SystemActor),
            sinks: Vec::new(),
        }
    }

    pub fn entity_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.entities = Some(store);
        self
    }

    pub fn revision_store(mut self, store: Arc<dyn RevisionStore>) -> Self {
        self.revisions = Some(store);
        self
    }

    pub fn staged_change_store(mut self, store: Arc<dyn StagedChangeStore>) -> Self {
        self.changes = Some(store);
        self
    }

    pub fn diff_registry(mut self, registry: Arc<DiffRegistry>) -> Self {
        self.diffs = Some(registry);
        self
    }

    pub fn approval_registry(mut self, registry: Arc<ApprovalRegistry>) -> Self {
        self.approvals = Some(registry);
        self
    }

    pub fn actor_resolver(mut self, actors: Arc<dyn ActorResolver>) -> Self {
        self.actors = actors;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validate the configuration and check that every strategy it names is
    /// registered.
    pub fn build(self) -> EngineResult<Engine> {
        self.config.validate()?;

        let diffs = self
            .diffs
            .unwrap_or_else(|| Arc::new(default_diff_registry()));
        let approvals = self
            .approvals
            .unwrap_or_else(|| Arc::new(default_approval_registry(self.config.quorum)));

        let (diff_ids, approval_ids) = self.config.referenced_strategies();
        if let Some(missing) = diff_ids.iter().find(|id| !diffs.contains(id)) {
            return Err(EngineError::Config(format!("unknown diff strategy '{missing}'")));
        }
        if let Some(missing) = approval_ids.iter().find(|id| !approvals.contains(id)) {
            return Err(EngineError::Config(format!("unknown approval strategy '{missing}'")));
        }

        let entities = self
            .entities
            .unwrap_or_else(|| Arc::new(InMemoryEntityStore::new()));
        let revisions = self
            .revisions
            .unwrap_or_else(|| Arc::new(InMemoryRevisionStore::new()));
        let changes = self
            .changes
            .unwrap_or_else(|| Arc::new(InMemoryStagedChangeStore::new()));

        let events = Arc::new(EventBus::new(self.config.events_enabled));
        for sink in self.sinks {
            events.subscribe(sink);
        }

        let config = Arc::new(self.config);
        let ledger = Arc::new(RevisionLedger::new(revisions, entities, diffs));
        let coordinator = StagedChangeCoordinator::new(
            Arc::clone(&ledger),
            changes,
            approvals,
            Arc::clone(&config),
            Arc::clone(&events),
        );

        tracing::debug!(
            diff = %config.default_diff_strategy,
            approval = %config.default_approval_strategy,
            entity_types = config.entity_types.len(),
            "engine built"
        );
        Ok(Engine {
            config,
            ledger,
            coordinator,
            events,
            actors: self.actors,
        })
    }
}

/// Facade over the ledger and the staged change coordinator.
///
/// Entity lifecycle writes go through the engine so they are recorded as
/// revisions. The acting user comes from the configured [`ActorResolver`].
pub struct Engine {
    config: Arc<EngineConfig>,
    ledger: Arc<RevisionLedger>,
    coordinator: StagedChangeCoordinator,
    events: Arc<EventBus>,
    actors: Arc<dyn ActorResolver>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// An engine over in-memory stores and the built-in strategies.
    pub fn in_memory(config: EngineConfig) -> EngineResult<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RevisionLedger {
        &self.ledger
    }

    pub fn coordinator(&self) -> &StagedChangeCoordinator {
        &self.coordinator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn entity_store(&self) -> &Arc<dyn EntityStore> {
        self.ledger.entity_store()
    }

    pub fn current_actor(&self) -> Option<ActorRef> {
        self.actors.current_actor()
    }

    // -----------------------------------------------------------------------
    // Tracked entity lifecycle
    // -----------------------------------------------------------------------

    /// Insert a new entity and record `Created`.
    pub fn create(&self, entity: &EntityRef, attributes: &Attributes) -> EngineResult<Option<Revision>> {
        self.entity_store().insert(entity, attributes)?;
        self.track(entity, RevisionAction::Created, &Attributes::new(), attributes)
    }

    /// Merge `changes` into the entity and record `Updated`. Nothing is
    /// recorded when no tracked attribute actually changed.
    pub fn update(&self, entity: &EntityRef, changes: &Attributes) -> EngineResult<Option<Revision>> {
        let before = self.entity_store().attributes(entity)?;
        let mut after = before.clone();
        after.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.entity_store().set_attributes(entity, &after)?;
        self.track(entity, RevisionAction::Updated, &before, &after)
    }

    /// Remove the entity and record `Deleted`. The state stays recoverable
    /// through [`Self::restore`].
    pub fn delete(&self, entity: &EntityRef) -> EngineResult<Option<Revision>> {
        let before = self.entity_store().attributes(entity)?;
        self.entity_store().remove(entity)?;
        self.track(entity, RevisionAction::Deleted, &before, &before)
    }

    /// Re-insert a deleted entity with its last recorded state.
    pub fn restore(&self, entity: &EntityRef) -> EngineResult<Option<Revision>> {
        let latest = self.ledger.latest(entity)?.ok_or_else(|| EngineError::Lifecycle {
            entity: entity.clone(),
            action: "restore",
            reason: "no recorded history".into(),
        })?;
        if latest.action != RevisionAction::Deleted {
            return Err(EngineError::Lifecycle {
                entity: entity.clone(),
                action: "restore",
                reason: format!("latest revision is {}, not deleted", latest.action),
            });
        }

        let state = self.ledger.reconstruct_at(entity, latest.version)?;
        self.entity_store().insert(entity, &state)?;
        self.track(entity, RevisionAction::Restored, &state, &state)
    }

    /// Remove the entity permanently, whether live or deleted, and record
    /// `ForceDeleted` leaving an empty replayed state.
    pub fn force_delete(&self, entity: &EntityRef) -> EngineResult<Option<Revision>> {
        let before = if self.entity_store().exists(entity)? {
            let attributes = self.entity_store().attributes(entity)?;
            self.entity_store().remove(entity)?;
            attributes
        } else {
            match self.ledger.latest(entity)? {
                Some(latest) if latest.action == RevisionAction::Deleted => {
                    self.ledger.reconstruct_at(entity, latest.version)?
                }
                _ => return Err(EngineError::TargetNotFound(entity.clone())),
            }
        };
        self.track(entity, RevisionAction::ForceDeleted, &before, &Attributes::new())
    }

    /// Restore the entity to `version` and record `Reverted`. Emits
    /// `RevisionAppended` followed by `RevisionReverted`.
    pub fn revert_to(&self, entity: &EntityRef, version: u32) -> EngineResult<Revision> {
        let strategy = self.config.diff_strategy_for(&entity.kind);
        let revision = self
            .ledger
            .revert_to(entity, version, strategy, self.current_actor())?;
        self.events.emit(Event::RevisionAppended {
            revision: revision.clone(),
        });
        self.events.emit(Event::RevisionReverted {
            revision: revision.clone(),
            target_version: version,
        });
        Ok(revision)
    }

    pub fn reconstruct_at(&self, entity: &EntityRef, version: u32) -> EngineResult<Attributes> {
        Ok(self.ledger.reconstruct_at(entity, version)?)
    }

    pub fn between(
        &self,
        entity: &EntityRef,
        from: u32,
        to: u32,
    ) -> EngineResult<BTreeMap<String, FieldChange>> {
        Ok(self.ledger.between(entity, from, to)?)
    }

    pub fn history(&self, entity: &EntityRef) -> EngineResult<Vec<Revision>> {
        Ok(self.ledger.history(entity)?)
    }

    // -----------------------------------------------------------------------
    // Staged changes, acting as the current actor
    // -----------------------------------------------------------------------

    pub fn stage(
        &self,
        entity: &EntityRef,
        proposed: &Attributes,
        reason: Option<String>,
    ) -> EngineResult<StagedChange> {
        self.coordinator
            .stage(entity, proposed, reason, self.current_actor())
    }

    pub fn approve(&self, id: &StagedChangeId, comment: Option<String>) -> EngineResult<bool> {
        self.coordinator.approve(id, self.current_actor(), comment)
    }

    pub fn reject(&self, id: &StagedChangeId, reason: Option<String>) -> EngineResult<bool> {
        self.coordinator.reject(id, self.current_actor(), reason)
    }

    pub fn apply(&self, id: &StagedChangeId) -> EngineResult<AppliedChange> {
        self.coordinator.apply(id, self.current_actor())
    }

    pub fn cancel(&self, id: &StagedChangeId) -> EngineResult<StagedChange> {
        self.coordinator.cancel(id, self.current_actor())
    }

    pub fn update_proposed_values(
        &self,
        id: &StagedChangeId,
        partial: &Attributes,
    ) -> EngineResult<StagedChange> {
        self.coordinator.update_proposed_values(id, partial)
    }

    pub fn approval_status(&self, id: &StagedChangeId) -> EngineResult<ApprovalStatus> {
        self.coordinator.status(id)
    }

    /// Record a lifecycle transition if the entity type is tracked and
    /// tracking is enabled for the entity.
    fn track(
        &self,
        entity: &EntityRef,
        action: RevisionAction,
        before: &Attributes,
        after: &Attributes,
    ) -> EngineResult<Option<Revision>> {
        let kind = &entity.kind;
        if !self.config.is_tracked(kind) {
            return Ok(None);
        }
        let old_values = self.config.filter_attributes(kind, before);
        let new_values = self.config.filter_attributes(kind, after);
        if action == RevisionAction::Updated && changed_fields(&old_values, &new_values).is_empty() {
            tracing::debug!(%entity, "update changed no tracked attribute");
            return Ok(None);
        }

        let input = RevisionInput::new(
            entity.clone(),
            action,
            old_values,
            new_values,
            self.config.diff_strategy_for(kind),
        )
        .caused_by(self.current_actor());
        let revision = self.ledger.record(input)?;
        if let Some(revision) = &revision {
            self.events.emit(Event::RevisionAppended {
                revision: revision.clone(),
            });
        }
        Ok(revision)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("events", &self.events)
            .finish()
    }
}
