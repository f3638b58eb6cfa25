// src/merge/mod.rs

//! Merge/reconciliation of parallel branches.
//!
//! - [`coordinator`]: cohort declaration, collection and merging.
//! - [`policy`]: the per-key merge policy and conflict records.
//! - [`validate`]: structural checks on merged data.
//! - `report`: plain-text rendering of a merged result.

pub mod coordinator;
pub mod policy;
mod report;
pub mod result;
pub mod validate;

pub use coordinator::MergeCoordinator;
pub use policy::{Conflict, ConflictCategory, MergeAccumulator};
pub use result::MergedResult;
pub use validate::{validate, validate_with, ValidationIssue, ValidationRules};
