//! Foundation types for the revision ledger (RVL).
//!
//! This crate provides the identity, lifecycle, and registry types shared by
//! every other RVL crate.
//!
//! # Key Types
//!
//! - [`EntityRef`] / [`ActorRef`]: typed `(kind, id)` references
//! - [`RevisionId`] / [`StagedChangeId`]: UUID v7 record identifiers
//! - [`Attributes`]: the opaque attribute map of an entity
//! - [`RevisionAction`]: what kind of transition a revision records
//! - [`StagedChangeStatus`]: lifecycle state of a staged change
//! - [`StrategyRegistry`]: identifier-keyed registry of pluggable strategies

pub mod action;
pub mod actor;
pub mod error;
pub mod identity;
pub mod ids;
pub mod registry;
pub mod status;

use std::collections::BTreeMap;

pub use action::RevisionAction;
pub use actor::{ActorResolver, FixedActor, SystemActor};
pub use error::{RegistryError, TypeError};
pub use identity::{ActorRef, EntityRef};
pub use ids::{RevisionId, StagedChangeId};
pub use registry::{Strategy, StrategyRegistry};
pub use status::StagedChangeStatus;

/// Attribute name to value mapping. The core never interprets the values.
pub type Attributes = BTreeMap<String, serde_json::Value>;
