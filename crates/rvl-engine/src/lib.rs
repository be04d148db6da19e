//! Engine layer of the revision ledger (RVL).
//!
//! Ties the ledger and the approval strategies together:
//! - [`StagedChangeCoordinator`] -- stage, vote, apply, and cancel staged
//!   changes, recording applied changes as revisions
//! - [`Engine`] -- facade with tracked entity lifecycle writes
//!   (create / update / delete / restore / force delete / revert)
//! - [`EngineConfig`] -- TOML-loadable defaults and per-entity-type overrides
//! - [`EventBus`] -- best-effort, toggleable event fan-out
//!
//! The engine never installs a tracing subscriber; hosts choose their own.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;

pub use config::{EngineConfig, EntityTypeConfig};
pub use coordinator::{AppliedChange, StagedChangeCoordinator, DEFAULT_MAX_VOTE_ATTEMPTS, STAGED_CHANGE_ID};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult};
pub use events::{Event, EventBus, EventKind, EventSink, RecordingSink, SinkError, TracingSink};
