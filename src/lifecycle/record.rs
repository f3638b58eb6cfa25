// src/lifecycle/record.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::TaskError;
use crate::lifecycle::resources::ResourceUsage;
use crate::types::{ResultMap, TaskId, TaskOutcome, TaskStatus};

/// Last sampled resource usage attributed to a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub memory_mb: f64,
    pub cpu_percent: f64,
    /// Number of handles registered through `TaskManager::track_handle`.
    pub handles: usize,
    pub sampled_at: Option<DateTime<Utc>>,
}

impl ResourceSnapshot {
    pub(crate) fn sampled(usage: ResourceUsage, handles: usize) -> Self {
        Self {
            memory_mb: usage.memory_mb,
            cpu_percent: usage.cpu_percent,
            handles,
            sampled_at: Some(Utc::now()),
        }
    }
}

impl Default for ResourceSnapshot {
    fn default() -> Self {
        Self {
            memory_mb: 0.0,
            cpu_percent: 0.0,
            handles: 0,
            sampled_at: None,
        }
    }
}

/// Snapshot of one dispatched unit of work.
///
/// The live record is owned by the task manager; callers only ever see
/// clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<ResultMap>,
    pub error: Option<TaskError>,
    pub resource_snapshot: ResourceSnapshot,
}

impl TaskRecord {
    pub(crate) fn new(task_id: TaskId, name: String) -> Self {
        Self {
            task_id,
            name,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            resource_snapshot: ResourceSnapshot::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move to the terminal state implied by `verdict`.
    ///
    /// `Timeout` maps to `TimedOut`, `Cancelled` to `Cancelled`, every other
    /// error to `Failed`.
    pub(crate) fn finish(&mut self, verdict: Result<ResultMap, TaskError>) {
        self.completed_at = Some(Utc::now());
        match verdict {
            Ok(result) => {
                self.status = TaskStatus::Completed;
                self.result = Some(result);
            }
            Err(error) => {
                self.status = match error {
                    TaskError::Timeout(_) => TaskStatus::TimedOut,
                    TaskError::Cancelled => TaskStatus::Cancelled,
                    TaskError::CapacityExceeded { .. } | TaskError::ExecutionFailed(_) => {
                        TaskStatus::Failed
                    }
                };
                self.error = Some(error);
            }
        }
    }

    pub fn to_outcome(&self) -> TaskOutcome {
        TaskOutcome {
            name: self.name.clone(),
            task_id: self.task_id,
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Runs once when the owning task reaches a terminal state.
///
/// Errors and panics are logged by the manager and never propagated.
pub type CleanupHandler = Box<dyn FnOnce(&TaskRecord) -> anyhow::Result<()> + Send + 'static>;

/// Box a closure as a [`CleanupHandler`].
pub fn cleanup_handler<F>(f: F) -> CleanupHandler
where
    F: FnOnce(&TaskRecord) -> anyhow::Result<()> + Send + 'static,
{
    Box::new(f)
}
