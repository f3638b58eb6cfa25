// src/lifecycle/resources.rs

//! Resource sampling for task snapshots.
//!
//! Units of work share one process, so the sampler reports process-wide
//! figures; the manager adds the per-task handle count.

use std::fmt;
use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

/// One reading from a [`ResourceSampler`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> ResourceUsage;
}

/// Always reports zero usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSampler;

impl ResourceSampler for NullSampler {
    fn sample(&self) -> ResourceUsage {
        ResourceUsage::default()
    }
}

/// Samples the current process through `sysinfo`.
///
/// CPU usage is the share consumed since the previous sample, so the first
/// reading reports zero. Platforms `sysinfo` does not support report zeros.
pub struct ProcessSampler {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(error = %e, "process sampling unavailable");
                None
            }
        };
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSampler").field("pid", &self.pid).finish()
    }
}

impl ResourceSampler for ProcessSampler {
    fn sample(&self) -> ResourceUsage {
        let Some(pid) = self.pid else {
            return ResourceUsage::default();
        };
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        match system.process(pid) {
            Some(process) => ResourceUsage {
                memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
                cpu_percent: f64::from(process.cpu_usage()),
            },
            None => ResourceUsage::default(),
        }
    }
}
