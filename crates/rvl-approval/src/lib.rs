//! Staged changes and approval strategies for the revision ledger (RVL).
//!
//! A [`StagedChange`] holds a proposed modification while voters approve or
//! reject it. An [`ApprovalStrategy`] turns the vote history into a decision;
//! the staged change records which strategy governs it by identifier.
//!
//! # Key Types
//!
//! - [`StagedChange`] / [`Vote`] -- the draft and its vote list
//! - [`SingleApproval`] -- the first vote decides
//! - [`QuorumApproval`] -- N approvals or M rejections from distinct voters
//! - [`StagedChangeStore`] -- storage boundary with compare-and-swap

pub mod error;
pub mod memory;
pub mod quorum;
pub mod records;
pub mod single;
pub mod strategy;
pub mod traits;

pub use error::{ApprovalError, ApprovalResult};
pub use memory::InMemoryStagedChangeStore;
pub use quorum::{QuorumApproval, APPROVALS_REQUIRED, REJECTIONS_REQUIRED};
pub use records::{ApprovalStatus, StagedChange, Vote};
pub use single::SingleApproval;
pub use strategy::{default_approval_registry, ApprovalRegistry, ApprovalStrategy, QuorumThresholds};
pub use traits::StagedChangeStore;
