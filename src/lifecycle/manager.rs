// src/lifecycle/manager.rs

//! The task lifecycle manager.
//!
//! Every dispatched unit of work gets a [`TaskRecord`] in a single registry.
//! The registry and the running counter are only touched inside one mutex
//! section per mutation, and never across an `.await`.
//!
//! State machine:
//!
//! - `Pending -> Running` when the driver task starts the unit.
//! - `Running -> Completed` on `Ok`, `Running -> Failed` on `Err` or panic.
//! - `Running -> TimedOut` when the time limit expires first.
//! - `Pending | Running -> Cancelled` through [`TaskManager::cancel`].
//!
//! A record moves to a terminal state exactly once. Whichever path gets
//! there first takes the cleanup handlers; later results are discarded.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::TaskError;
use crate::exec::pool::panic_message;
use crate::exec::WorkerPool;
use crate::lifecycle::monitor::{self, MonitorHandle};
use crate::lifecycle::record::{CleanupHandler, ResourceSnapshot, TaskRecord};
use crate::lifecycle::resources::{ProcessSampler, ResourceSampler};
use crate::progress::{NullSink, ProgressEvent, ProgressSink};
use crate::types::{ResultMap, TaskId, TaskOutcome, TaskStatus};

/// Construction-time settings of a [`TaskManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Maximum number of admitted, non-terminal records.
    pub ceiling: usize,
    /// Applied when `submit` is called without a timeout.
    pub default_timeout: Option<Duration>,
    pub monitor_interval: Duration,
    /// Terminal records older than this are reaped by the monitor.
    pub retention: Duration,
    pub worker_pool_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ceiling: 10,
            default_timeout: None,
            monitor_interval: Duration::from_secs(5),
            retention: Duration::from_secs(3600),
            worker_pool_size: 10,
        }
    }
}

/// Registry counters and per-status totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub total: usize,
    pub running: usize,
    pub peak_running: usize,
    pub ceiling: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
}

struct Entry {
    record: TaskRecord,
    cleanup: Vec<CleanupHandler>,
    cancel: Option<oneshot::Sender<()>>,
    handles: Vec<String>,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<TaskId, Entry>,
    /// Admitted records that are not terminal yet.
    running: usize,
    peak_running: usize,
}

pub(super) struct Shared {
    config: ManagerConfig,
    registry: Mutex<Registry>,
    pool: WorkerPool,
    sampler: Arc<dyn ResourceSampler>,
    progress: Arc<dyn ProgressSink>,
    monitor: Mutex<Option<MonitorHandle>>,
}

/// Awaitable outcome of one submitted unit.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    name: String,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the terminal outcome.
    pub async fn wait(self) -> TaskOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::abandoned(self.name, self.task_id),
        }
    }
}

pub struct TaskManagerBuilder {
    config: ManagerConfig,
    sampler: Option<Arc<dyn ResourceSampler>>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl TaskManagerBuilder {
    pub fn sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn build(self) -> TaskManager {
        let ceiling = self.config.ceiling.max(1);
        let config = ManagerConfig {
            ceiling,
            ..self.config
        };
        let pool = WorkerPool::new(config.worker_pool_size);

        TaskManager {
            shared: Arc::new(Shared {
                config,
                registry: Mutex::new(Registry::default()),
                pool,
                sampler: self
                    .sampler
                    .unwrap_or_else(|| Arc::new(ProcessSampler::new())),
                progress: self.progress.unwrap_or_else(|| Arc::new(NullSink)),
                monitor: Mutex::new(None),
            }),
        }
    }
}

/// Owns every dispatched unit of work.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct TaskManager {
    shared: Arc<Shared>,
}

impl TaskManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ManagerConfig) -> TaskManagerBuilder {
        TaskManagerBuilder {
            config,
            sampler: None,
            progress: None,
        }
    }

    pub(super) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(super) fn downgrade(&self) -> std::sync::Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn ceiling(&self) -> usize {
        self.shared.config.ceiling
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.shared.pool
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a unit of work and start it on the worker pool.
    ///
    /// Rejected with [`TaskError::CapacityExceeded`] when the ceiling is
    /// already reached; a rejected unit gets no record and its cleanup
    /// handlers are dropped unrun. `timeout` falls back to the configured
    /// default. Must be called from within a Tokio runtime.
    pub fn submit<F>(
        &self,
        name: impl Into<String>,
        work: F,
        timeout: Option<Duration>,
        cleanup: Vec<CleanupHandler>,
    ) -> Result<TaskHandle, TaskError>
    where
        F: Future<Output = Result<ResultMap, TaskError>> + Send + 'static,
    {
        let name = name.into();
        let ceiling = self.ceiling();
        let task_id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let snapshot = {
            let mut reg = self.registry();
            if reg.running >= ceiling {
                warn!(task = %name, ceiling, "submission rejected: capacity exceeded");
                return Err(TaskError::CapacityExceeded { ceiling });
            }

            let record = TaskRecord::new(task_id, name.clone());
            let snapshot = record.clone();
            reg.tasks.insert(
                task_id,
                Entry {
                    record,
                    cleanup,
                    cancel: Some(cancel_tx),
                    handles: Vec::new(),
                },
            );
            reg.running += 1;
            reg.peak_running = reg.peak_running.max(reg.running);
            snapshot
        };

        debug!(task = %name, task_id = %task_id, "task admitted");
        self.notify(&snapshot);

        let limit = timeout.or(self.shared.config.default_timeout);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let manager = self.clone();
        let driver_name = name.clone();
        tokio::spawn(async move {
            let outcome = manager
                .drive(task_id, &driver_name, work, limit, cancel_rx)
                .await;
            // The caller may have dropped its handle.
            let _ = outcome_tx.send(outcome);
        });

        Ok(TaskHandle {
            task_id,
            name,
            rx: outcome_rx,
        })
    }

    async fn drive<F>(
        &self,
        task_id: TaskId,
        name: &str,
        work: F,
        limit: Option<Duration>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> TaskOutcome
    where
        F: Future<Output = Result<ResultMap, TaskError>> + Send + 'static,
    {
        if !self.mark_running(task_id) {
            // Cancelled (or cleared by shutdown) before it ever started.
            return self.settle(task_id, name, Err(TaskError::Cancelled));
        }

        let handle = self.shared.pool.spawn(work);
        let run = async move {
            let joined = match limit {
                Some(limit) => match tokio::time::timeout(limit, handle).await {
                    Ok(joined) => joined,
                    Err(_) => return Err(TaskError::Timeout(limit)),
                },
                None => handle.await,
            };
            match joined {
                Ok(verdict) => verdict,
                Err(join) if join.is_panic() => Err(TaskError::failed(format!(
                    "unit of work panicked: {}",
                    panic_message(join.into_panic())
                ))),
                Err(join) => Err(TaskError::failed(join.to_string())),
            }
        };

        // Dropping `run` detaches the unit: it keeps its pool slot until it
        // finishes on its own, and its result goes nowhere.
        let verdict = tokio::select! {
            biased;
            _ = &mut cancel_rx => Err(TaskError::Cancelled),
            verdict = run => verdict,
        };

        self.settle(task_id, name, verdict)
    }

    fn mark_running(&self, task_id: TaskId) -> bool {
        let snapshot = {
            let mut reg = self.registry();
            match reg.tasks.get_mut(&task_id) {
                Some(entry) if entry.record.status == TaskStatus::Pending => {
                    entry.record.start();
                    entry.record.clone()
                }
                _ => return false,
            }
        };
        info!(task = %snapshot.name, task_id = %task_id, "task started");
        self.notify(&snapshot);
        true
    }

    /// Apply a terminal verdict unless the record already settled.
    ///
    /// Returns the record's final outcome either way.
    fn settle(
        &self,
        task_id: TaskId,
        name: &str,
        verdict: Result<ResultMap, TaskError>,
    ) -> TaskOutcome {
        match self.transition(task_id, verdict) {
            Transition::Settled(record, handlers) => {
                match &record.error {
                    None => info!(task = %record.name, task_id = %task_id, "task completed"),
                    Some(err) => warn!(
                        task = %record.name,
                        task_id = %task_id,
                        status = %record.status,
                        error = %err,
                        "task did not complete"
                    ),
                }
                self.notify(&record);
                run_cleanup(&record, handlers);
                record.to_outcome()
            }
            Transition::AlreadyTerminal(record) => {
                debug!(
                    task = %record.name,
                    task_id = %task_id,
                    status = %record.status,
                    "record already terminal; discarding late result"
                );
                record.to_outcome()
            }
            Transition::Missing => {
                debug!(task = %name, task_id = %task_id, "record gone before the unit settled");
                TaskOutcome::abandoned(name, task_id)
            }
        }
    }

    fn transition(&self, task_id: TaskId, verdict: Result<ResultMap, TaskError>) -> Transition {
        let usage = self.shared.sampler.sample();
        let mut reg = self.registry();
        let Registry { tasks, running, .. } = &mut *reg;

        let Some(entry) = tasks.get_mut(&task_id) else {
            return Transition::Missing;
        };
        if entry.record.is_terminal() {
            return Transition::AlreadyTerminal(entry.record.clone());
        }

        entry.record.finish(verdict);
        entry.record.resource_snapshot = ResourceSnapshot::sampled(usage, entry.handles.len());
        entry.cancel = None;
        *running = running.saturating_sub(1);

        Transition::Settled(entry.record.clone(), std::mem::take(&mut entry.cleanup))
    }

    /// Snapshot of one record.
    pub fn status(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.registry()
            .tasks
            .get(&task_id)
            .map(|entry| entry.record.clone())
    }

    /// Cancel a pending or running record.
    ///
    /// Returns `false` (and changes nothing) if the record is unknown or
    /// already terminal. A unit already in flight is not interrupted; its
    /// eventual result is discarded.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        let usage = self.shared.sampler.sample();
        let (record, handlers, signal) = {
            let mut reg = self.registry();
            let Registry { tasks, running, .. } = &mut *reg;

            let Some(entry) = tasks.get_mut(&task_id) else {
                return false;
            };
            if entry.record.is_terminal() {
                return false;
            }

            entry.record.finish(Err(TaskError::Cancelled));
            entry.record.resource_snapshot = ResourceSnapshot::sampled(usage, entry.handles.len());
            *running = running.saturating_sub(1);
            (
                entry.record.clone(),
                std::mem::take(&mut entry.cleanup),
                entry.cancel.take(),
            )
        };

        if let Some(signal) = signal {
            let _ = signal.send(());
        }

        info!(task = %record.name, task_id = %task_id, "task cancelled");
        self.notify(&record);
        run_cleanup(&record, handlers);
        true
    }

    /// Snapshots of all records, optionally filtered by status, oldest first.
    pub fn list(&self, filter: Option<TaskStatus>) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .registry()
            .tasks
            .values()
            .filter(|entry| filter.is_none_or(|status| entry.record.status == status))
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        records
    }

    pub fn running_count(&self) -> usize {
        self.registry().running
    }

    /// Highest `running_count` observed since construction.
    pub fn peak_running(&self) -> usize {
        self.registry().peak_running
    }

    pub fn stats(&self) -> ManagerStats {
        let reg = self.registry();
        let mut by_status = BTreeMap::new();
        for entry in reg.tasks.values() {
            *by_status.entry(entry.record.status).or_insert(0) += 1;
        }
        ManagerStats {
            total: reg.tasks.len(),
            running: reg.running,
            peak_running: reg.peak_running,
            ceiling: self.ceiling(),
            by_status,
        }
    }

    /// Attribute an external handle (connection, browser context, ...) to a
    /// live task. Returns `false` for unknown or terminal records.
    pub fn track_handle(&self, task_id: TaskId, handle: impl Into<String>) -> bool {
        let mut reg = self.registry();
        match reg.tasks.get_mut(&task_id) {
            Some(entry) if !entry.record.is_terminal() => {
                entry.handles.push(handle.into());
                entry.record.resource_snapshot.handles = entry.handles.len();
                true
            }
            _ => false,
        }
    }

    pub fn release_handle(&self, task_id: TaskId, handle: &str) -> bool {
        let mut reg = self.registry();
        let Some(entry) = reg.tasks.get_mut(&task_id) else {
            return false;
        };
        let Some(pos) = entry.handles.iter().position(|h| h == handle) else {
            return false;
        };
        entry.handles.remove(pos);
        entry.record.resource_snapshot.handles = entry.handles.len();
        true
    }

    /// Resample resources for every running record.
    pub fn refresh_resources(&self) {
        let usage = self.shared.sampler.sample();
        let mut reg = self.registry();
        for entry in reg.tasks.values_mut() {
            if entry.record.status == TaskStatus::Running {
                entry.record.resource_snapshot =
                    ResourceSnapshot::sampled(usage, entry.handles.len());
            }
        }
    }

    /// Drop terminal records that completed more than `retention` ago.
    ///
    /// Returns the number of records removed.
    pub fn reap_older_than(&self, retention: Duration) -> usize {
        let Ok(window) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(window) else {
            return 0;
        };

        let mut reg = self.registry();
        let before = reg.tasks.len();
        reg.tasks.retain(|_, entry| {
            !(entry.record.is_terminal()
                && entry.record.completed_at.is_some_and(|at| at <= cutoff))
        });
        before - reg.tasks.len()
    }

    /// Start the background monitor if it is not already running.
    pub fn start_monitor(&self) {
        let mut slot = self
            .shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("task monitor already running");
            return;
        }
        *slot = Some(monitor::spawn(self, self.shared.config.monitor_interval));
    }

    pub async fn stop_monitor(&self) {
        let handle = self
            .shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn monitor_running(&self) -> bool {
        self.shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancel every non-terminal record, stop the monitor, run any cleanup
    /// handlers still outstanding and clear the registry.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let live: Vec<TaskId> = self
            .registry()
            .tasks
            .iter()
            .filter(|(_, entry)| !entry.record.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        let cancelled = live.into_iter().filter(|id| self.cancel(*id)).count();

        self.stop_monitor().await;

        let leftovers: Vec<Entry> = {
            let mut reg = self.registry();
            reg.running = 0;
            reg.tasks.drain().map(|(_, entry)| entry).collect()
        };
        let cleared = leftovers.len();
        for entry in leftovers {
            if !entry.cleanup.is_empty() {
                run_cleanup(&entry.record, entry.cleanup);
            }
        }

        info!(cancelled, cleared, "task manager shut down");
    }

    fn notify(&self, record: &TaskRecord) {
        if let Err(e) = self.shared.progress.emit(&ProgressEvent::from(record)) {
            warn!(task = %record.name, error = %e, "progress event dropped");
        }
    }
}

enum Transition {
    Settled(TaskRecord, Vec<CleanupHandler>),
    AlreadyTerminal(TaskRecord),
    Missing,
}

/// Run handlers in order; failures are logged and swallowed.
fn run_cleanup(record: &TaskRecord, handlers: Vec<CleanupHandler>) {
    for (index, handler) in handlers.into_iter().enumerate() {
        match std::panic::catch_unwind(AssertUnwindSafe(move || handler(record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                task = %record.name,
                task_id = %record.task_id,
                handler = index,
                error = %format!("{e:#}"),
                "cleanup handler failed"
            ),
            Err(payload) => error!(
                task = %record.name,
                task_id = %record.task_id,
                handler = index,
                panic = %panic_message(payload),
                "cleanup handler panicked"
            ),
        }
    }
}
