// src/exec/pool.rs

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::trace;

/// Bounded pool for units of work.
///
/// Each unit runs on its own Tokio task but only starts once one of `size`
/// worker slots is free. The pool size is independent of the scheduling
/// ceiling: units abandoned by a timeout or cancellation keep their slot
/// until they actually finish, so the pool bounds real background work
/// while the ceiling bounds admitted records.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` worker slots (clamped to at least 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Worker slots not currently held by a unit of work.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` on the pool.
    ///
    /// Dropping the returned handle detaches the work; it keeps running to
    /// completion and its output is discarded.
    pub fn spawn<F, T>(&self, work: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = permits.acquire_owned().await.ok();
            trace!("worker slot acquired");
            work.await
        })
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
