// src/dag/context.rs

//! Accumulated state of one graph run and the final report handed back to
//! callers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::JoindagError;
use crate::merge::MergedResult;
use crate::types::TaskOutcome;

/// Shared execution context for one graph run.
///
/// Only the scheduler writes to it. Merged results are inserted through
/// [`ExecutionContext::publish_merge`] and handed to executors as a
/// read-only snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionContext {
    pub completed: Vec<TaskOutcome>,
    pub failed: Vec<TaskOutcome>,
    pub merged_results: BTreeMap<String, MergedResult>,
}

impl ExecutionContext {
    pub(crate) fn record(&mut self, outcome: TaskOutcome) {
        if outcome.is_success() {
            self.completed.push(outcome);
        } else {
            self.failed.push(outcome);
        }
    }

    pub(crate) fn publish_merge(&mut self, merged: MergedResult) {
        self.merged_results.insert(merged.cohort_id.clone(), merged);
    }

    /// Ids of completed tasks in completion order.
    pub fn completed_ids(&self) -> Vec<&str> {
        self.completed.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn outcome_of(&self, name: &str) -> Option<&TaskOutcome> {
        self.completed
            .iter()
            .chain(self.failed.iter())
            .find(|o| o.name == name)
    }
}

/// A task that was never dispatched because an ancestor did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTask {
    pub id: String,
    /// The failed, cancelled or timed-out task that blocks it.
    pub failed_ancestor: String,
}

/// What a graph run produced.
///
/// `context.completed`, `context.failed`, `blocked` and `unsatisfiable` are
/// disjoint and together cover every task in the graph.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub session_id: String,
    pub context: ExecutionContext,
    pub blocked: Vec<BlockedTask>,
    /// Tasks left pending because their dependencies can never be met
    /// (cycle, unknown task, or downstream of one).
    pub unsatisfiable: Vec<String>,
    /// Cycles among the unsatisfiable tasks.
    pub cycles: Vec<Vec<String>>,
    /// Dispatched batches in order.
    pub rounds: Vec<Vec<String>>,
}

impl ExecutionResult {
    /// True when every task completed.
    pub fn is_success(&self) -> bool {
        self.context.failed.is_empty() && self.blocked.is_empty() && self.unsatisfiable.is_empty()
    }

    pub fn blocked_ids(&self) -> Vec<&str> {
        self.blocked.iter().map(|b| b.id.as_str()).collect()
    }

    /// The graph-level error that stopped the run early, if any.
    pub fn error(&self) -> Option<JoindagError> {
        if self.unsatisfiable.is_empty() {
            return None;
        }
        Some(JoindagError::DependencyUnsatisfiable {
            pending: self.unsatisfiable.clone(),
            cycles: self.cycles.clone(),
        })
    }
}
