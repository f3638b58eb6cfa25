// src/progress.rs

//! Best-effort status-change notifications.
//!
//! The task manager emits a [`ProgressEvent`] on every status change. Sinks
//! must not block; a failed delivery is logged by the caller and otherwise
//! ignored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::errors::SinkError;
use crate::lifecycle::TaskRecord;
use crate::types::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub at: DateTime<Utc>,
}

impl From<&TaskRecord> for ProgressEvent {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.task_id,
            name: record.name.clone(),
            status: record.status,
            at: Utc::now(),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        info!(
            task = %event.name,
            task_id = %event.task_id,
            status = %event.status,
            "task status changed"
        );
        Ok(())
    }
}

/// Forwards events into a bounded channel without waiting.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
