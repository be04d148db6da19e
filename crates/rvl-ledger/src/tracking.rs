//! Per-entity suppression of automatic revision tracking.
//!
//! Programmatic writes that record their own revision (a revert's write-back,
//! an applied staged change) disable tracking for the entity while they write
//! so the change is not recorded twice.
//!
//! The registry belongs to one ledger instance rather than the process. It is
//! memory-safe under concurrency, but two tasks toggling tracking for the
//! *same* entity at the same time is undefined: whichever guard drops last
//! decides the final state.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use rvl_types::EntityRef;

/// Set of entities whose tracking is currently disabled.
#[derive(Debug, Default)]
pub struct TrackingRegistry {
    disabled: Mutex<HashSet<EntityRef>>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` unless tracking is disabled for the entity.
    pub fn is_tracking(&self, entity: &EntityRef) -> bool {
        !self.lock().contains(entity)
    }

    /// Disable tracking until [`Self::enable_tracking`] is called.
    pub fn disable_tracking(&self, entity: &EntityRef) {
        self.lock().insert(entity.clone());
    }

    pub fn enable_tracking(&self, entity: &EntityRef) {
        self.lock().remove(entity);
    }

    /// Disable tracking until the returned guard drops, then restore the
    /// state that held before the call. Guards nest.
    #[must_use = "tracking is re-enabled as soon as the guard is dropped"]
    pub fn without_tracking(&self, entity: &EntityRef) -> TrackingGuard<'_> {
        let was_disabled = !self.lock().insert(entity.clone());
        TrackingGuard {
            registry: self,
            entity: entity.clone(),
            was_disabled,
        }
    }

    /// Run `f` with tracking disabled for the entity. The prior state is
    /// restored on every exit path, including early error returns and panics.
    pub fn with_tracking_disabled<R>(&self, entity: &EntityRef, f: impl FnOnce() -> R) -> R {
        let _guard = self.without_tracking(entity);
        f()
    }

    // The set holds plain flags; a panic while holding the lock cannot leave
    // it inconsistent, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashSet<EntityRef>> {
        self.disabled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scope token returned by [`TrackingRegistry::without_tracking`].
#[derive(Debug)]
pub struct TrackingGuard<'a> {
    registry: &'a TrackingRegistry,
    entity: EntityRef,
    was_disabled: bool,
}

impl TrackingGuard<'_> {
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        if !self.was_disabled {
            self.registry.enable_tracking(&self.entity);
        }
    }
}
