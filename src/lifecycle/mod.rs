// src/lifecycle/mod.rs

//! Background task lifecycle management.
//!
//! - [`manager`] owns the registry of task records, admission against the
//!   concurrency ceiling, timeouts, cancellation, cleanup and shutdown.
//! - [`record`] holds the record, snapshot and cleanup handler types.
//! - [`resources`] samples process resource usage for snapshots.
//! - `monitor` is the periodic refresh/reap loop.

pub mod manager;
mod monitor;
pub mod record;
pub mod resources;

pub use manager::{ManagerConfig, ManagerStats, TaskHandle, TaskManager, TaskManagerBuilder};
pub use record::{cleanup_handler, CleanupHandler, ResourceSnapshot, TaskRecord};
pub use resources::{NullSampler, ProcessSampler, ResourceSampler, ResourceUsage};
