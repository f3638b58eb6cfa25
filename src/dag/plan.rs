// src/dag/plan.rs

//! Planner output: task descriptors plus merge-point declarations.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;

/// Immutable description of one unit of work in a graph.
///
/// `payload` is opaque to the core; it is handed to the executor as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub id: String,
    pub dependencies: BTreeSet<String>,
    pub payload: Value,
    /// Tie-break hint: lower values are dispatched first. `None` sorts last.
    pub priority: Option<i64>,
    /// Overrides the task manager's default timeout.
    pub timeout: Option<Duration>,
}

impl TaskDescriptor {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            dependencies: BTreeSet::new(),
            payload,
            priority: None,
            timeout: None,
        }
    }

    pub fn after(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    pub fn after_all<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A synchronization point: the outcomes of every task in `cohort` are merged
/// into one result once all of them are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePoint {
    pub id: String,
    pub cohort: Vec<String>,
}

impl MergePoint {
    pub fn new<I, S>(id: impl Into<String>, cohort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            cohort: cohort.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything the scheduler needs for one graph run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub tasks: Vec<TaskDescriptor>,
    pub merge_points: Vec<MergePoint>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task: TaskDescriptor) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn merge_point<I, S>(mut self, id: impl Into<String>, cohort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.merge_points.push(MergePoint::new(id, cohort));
        self
    }
}
