// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The scheduler talks to an `Executor` instead of running domain actions
//! itself. Production uses [`crate::exec::CommandExecutor`]; tests plug in
//! scripted fakes.
//!
//! An executor only *describes* the work by returning a future. The task
//! manager runs that future on its bounded worker pool, so a slow executor
//! never stalls the scheduler loop.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::TaskError;
use crate::merge::MergedResult;
use crate::types::ResultMap;

/// Future returned by [`Executor::execute`].
pub type WorkFuture = Pin<Box<dyn Future<Output = Result<ResultMap, TaskError>> + Send + 'static>>;

/// Everything an executor gets for one unit of work.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    /// Descriptor id of the task.
    pub name: String,
    /// Opaque payload from the task descriptor.
    pub payload: Value,
    /// Merge results published before this task was dispatched.
    pub merged: Arc<BTreeMap<String, MergedResult>>,
}

impl WorkRequest {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            merged: Arc::new(BTreeMap::new()),
        }
    }
}

/// Trait abstracting how a task's domain action is performed.
pub trait Executor: Send + Sync {
    /// Build the unit of work for `request`.
    ///
    /// The returned future must be `'static`: clone whatever state it needs.
    fn execute(&self, request: WorkRequest) -> WorkFuture;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, request: WorkRequest) -> WorkFuture {
        (**self).execute(request)
    }
}

/// Executor backed by a synchronous closure.
///
/// The closure runs on Tokio's blocking thread pool, so it may perform
/// blocking IO.
pub struct FnExecutor<F> {
    f: Arc<F>,
}

impl<F> FnExecutor<F>
where
    F: Fn(WorkRequest) -> Result<ResultMap, TaskError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> Executor for FnExecutor<F>
where
    F: Fn(WorkRequest) -> Result<ResultMap, TaskError> + Send + Sync + 'static,
{
    fn execute(&self, request: WorkRequest) -> WorkFuture {
        let f = Arc::clone(&self.f);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || f(request)).await {
                Ok(result) => result,
                Err(join) if join.is_panic() => Err(TaskError::failed(format!(
                    "blocking executor panicked: {}",
                    super::pool::panic_message(join.into_panic())
                ))),
                Err(join) => Err(TaskError::failed(join.to_string())),
            }
        })
    }
}
