use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TaskError;

/// Identifier generated by the task manager for every dispatched unit.
///
/// Independent of the descriptor id: the same descriptor may be submitted
/// more than once (e.g. retried) and every submission gets a fresh id.
pub type TaskId = Uuid;

/// Result payload produced by an executor: a JSON object.
pub type ResultMap = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a task record.
///
/// `Completed`, `Failed`, `Cancelled` and `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            "timed_out" | "timeout" => Ok(TaskStatus::TimedOut),
            other => Err(format!("invalid task status: {other}")),
        }
    }
}

/// Terminal outcome of one dispatched unit, as surfaced to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Descriptor id (or other caller-supplied label) of the unit.
    pub name: String,
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Present only when `status == Completed`.
    pub result: Option<ResultMap>,
    pub error: Option<TaskError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Outcome for a unit that never got a record (e.g. rejected at admission).
    pub fn rejected(name: impl Into<String>, error: TaskError) -> Self {
        Self {
            name: name.into(),
            task_id: Uuid::new_v4(),
            status: TaskStatus::Failed,
            result: None,
            error: Some(error),
            started_at: None,
            completed_at: Utc::now(),
        }
    }

    /// Outcome for a unit whose record disappeared before it settled
    /// (registry cleared by shutdown).
    pub(crate) fn abandoned(name: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            name: name.into(),
            task_id,
            status: TaskStatus::Cancelled,
            result: None,
            error: Some(TaskError::Cancelled),
            started_at: None,
            completed_at: Utc::now(),
        }
    }
}
