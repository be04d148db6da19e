use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rvl_approval::StagedChange;
use rvl_ledger::Revision;
use rvl_types::{ActorRef, EntityRef};

/// Classification of engine events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    RevisionAppended,
    RevisionReverted,
    StagedChangeCreated,
    StagedChangeApproved,
    StagedChangeRejected,
    StagedChangeApplied,
    StagedChangeCancelled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RevisionAppended => "RevisionAppended",
            Self::RevisionReverted => "RevisionReverted",
            Self::StagedChangeCreated => "StagedChangeCreated",
            Self::StagedChangeApproved => "StagedChangeApproved",
            Self::StagedChangeRejected => "StagedChangeRejected",
            Self::StagedChangeApplied => "StagedChangeApplied",
            Self::StagedChangeCancelled => "StagedChangeCancelled",
        };
        write!(f, "{s}")
    }
}

/// Something that happened inside the engine, with the value it concerns
/// and whoever acted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    RevisionAppended {
        revision: Revision,
    },
    RevisionReverted {
        revision: Revision,
        target_version: u32,
    },
    StagedChangeCreated {
        change: StagedChange,
        actor: Option<ActorRef>,
    },
    StagedChangeApproved {
        change: StagedChange,
        actor: Option<ActorRef>,
    },
    StagedChangeRejected {
        change: StagedChange,
        actor: Option<ActorRef>,
    },
    StagedChangeApplied {
        change: StagedChange,
        revision: Option<Revision>,
        actor: Option<ActorRef>,
    },
    StagedChangeCancelled {
        change: StagedChange,
        actor: Option<ActorRef>,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RevisionAppended { .. } => EventKind::RevisionAppended,
            Self::RevisionReverted { .. } => EventKind::RevisionReverted,
            Self::StagedChangeCreated { .. } => EventKind::StagedChangeCreated,
            Self::StagedChangeApproved { .. } => EventKind::StagedChangeApproved,
            Self::StagedChangeRejected { .. } => EventKind::StagedChangeRejected,
            Self::StagedChangeApplied { .. } => EventKind::StagedChangeApplied,
            Self::StagedChangeCancelled { .. } => EventKind::StagedChangeCancelled,
        }
    }

    pub fn entity(&self) -> &EntityRef {
        match self {
            Self::RevisionAppended { revision } | Self::RevisionReverted { revision, .. } => {
                &revision.entity
            }
            Self::StagedChangeCreated { change, .. }
            | Self::StagedChangeApproved { change, .. }
            | Self::StagedChangeRejected { change, .. }
            | Self::StagedChangeApplied { change, .. }
            | Self::StagedChangeCancelled { change, .. } => &change.entity,
        }
    }

    pub fn actor(&self) -> Option<&ActorRef> {
        match self {
            Self::RevisionAppended { revision } | Self::RevisionReverted { revision, .. } => {
                revision.causer.as_ref()
            }
            Self::StagedChangeCreated { actor, .. }
            | Self::StagedChangeApproved { actor, .. }
            | Self::StagedChangeRejected { actor, .. }
            | Self::StagedChangeApplied { actor, .. }
            | Self::StagedChangeCancelled { actor, .. } => actor.as_ref(),
        }
    }
}

/// Failure reported by a sink. Logged by the bus, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event sink failed: {0}")]
pub struct SinkError(pub String);

/// Receiver of engine events. Must not block.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &Event) -> Result<(), SinkError>;
}

/// Fire-and-forget fan-out to registered sinks.
///
/// Emission never fails the operation it accompanies: sink errors and a
/// poisoned sink list are logged and skipped.
pub struct EventBus {
    enabled: AtomicBool,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(sink),
            Err(_) => tracing::warn!("event sink list poisoned, subscription dropped"),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn emit(&self, event: Event) {
        if !self.is_enabled() {
            return;
        }
        let Ok(sinks) = self.sinks.read() else {
            tracing::warn!(kind = %event.kind(), "event sink list poisoned, event dropped");
            return;
        };
        for sink in sinks.iter() {
            if let Err(error) = sink.handle(&event) {
                tracing::warn!(kind = %event.kind(), entity = %event.entity(), %error, "event sink failed");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("enabled", &self.is_enabled())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Logs every event at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&self, event: &Event) -> Result<(), SinkError> {
        let actor = event.actor().map(ToString::to_string);
        tracing::info!(kind = %event.kind(), entity = %event.entity(), actor = ?actor, "engine event");
        Ok(())
    }
}

/// Keeps every event in memory. Useful in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(Event::kind).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for RecordingSink {
    fn handle(&self, event: &Event) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError("recording sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}
