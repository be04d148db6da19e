//! Entity storage boundary for the revision ledger.
//!
//! The ledger never decides how entities are persisted. It reads and writes
//! attribute maps through [`EntityStore`], which SQL tables, document stores,
//! or plain maps can all implement.
//!
//! # Design Rules
//!
//! 1. The store never interprets attribute values.
//! 2. A missing entity is an explicit [`StoreError::NotFound`], never an empty map.
//! 3. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryEntityStore;
pub use traits::EntityStore;
