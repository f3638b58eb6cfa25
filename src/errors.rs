// src/errors.rs

//! Crate-wide error types.
//!
//! - [`JoindagError`] covers configuration, IO and graph-level failures.
//! - [`TaskError`] is the terminal error carried by a single task record. It is
//!   plain data: it is stored in records and outcomes, never thrown across the
//!   scheduler/manager boundary.
//! - [`MergeError`] is returned by the merge coordinator for misuse (unknown
//!   cohorts, merging too early). Disagreements between results are *not*
//!   errors; they are recorded as conflicts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoindagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(
        "Dependencies unsatisfiable for {} pending task(s): {pending:?} (cycles: {cycles:?})",
        pending.len()
    )]
    DependencyUnsatisfiable {
        pending: Vec<String>,
        cycles: Vec<Vec<String>>,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Terminal error of a single unit of work.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    /// Submission rejected because the concurrency ceiling was reached.
    #[error("capacity exceeded: {ceiling} task(s) already admitted")]
    CapacityExceeded { ceiling: usize },

    /// The unit of work returned an error or panicked.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The unit of work did not finish within its allotted time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Explicit cancellation (operator action or shutdown).
    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    /// Convenience constructor for executor failures.
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::ExecutionFailed(msg.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("unknown cohort: {0}")]
    UnknownCohort(String),

    #[error("cohort '{0}' is already declared")]
    AlreadyDeclared(String),

    #[error("cohort '{cohort}' is still waiting on {waiting:?}")]
    CohortIncomplete {
        cohort: String,
        waiting: Vec<String>,
    },

    #[error("'{member}' is not a member of cohort '{cohort}'")]
    NotAMember { cohort: String, member: String },

    #[error("no conflict with id {0}")]
    UnknownConflict(usize),
}

/// Delivery failure of a best-effort progress sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("progress channel is full")]
    Full,

    #[error("progress channel is closed")]
    Closed,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JoindagError>;
