use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use joindag::errors::TaskError;
use joindag::exec::{Executor, WorkFuture, WorkRequest};
use joindag::types::ResultMap;

/// What a scripted task does when it runs.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed(ResultMap),
    Fail(String),
    /// Sleep, then succeed with the map.
    Sleep(Duration, ResultMap),
    Panic(String),
}

#[derive(Debug, Default)]
struct Probe {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    /// Merge point ids visible to each task when it was dispatched.
    merges_seen: Mutex<HashMap<String, Vec<String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the in-flight counter even if the unit panics or is dropped.
struct InFlight(Arc<Probe>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fake executor that:
/// - runs a per-task scripted [`Behaviour`] (default: succeed with `{}`)
/// - records start and finish order
/// - tracks the peak number of units running at once.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    behaviours: HashMap<String, Behaviour>,
    probe: Arc<Probe>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, task: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(task.to_string(), behaviour);
        self
    }

    pub fn succeed(self, task: &str, result: ResultMap) -> Self {
        self.with(task, Behaviour::Succeed(result))
    }

    pub fn fail(self, task: &str, msg: &str) -> Self {
        self.with(task, Behaviour::Fail(msg.to_string()))
    }

    pub fn sleep(self, task: &str, duration: Duration) -> Self {
        self.with(task, Behaviour::Sleep(duration, ResultMap::new()))
    }

    pub fn panic(self, task: &str, msg: &str) -> Self {
        self.with(task, Behaviour::Panic(msg.to_string()))
    }

    /// Tasks in the order their units started running.
    pub fn started(&self) -> Vec<String> {
        self.probe.started.lock().unwrap().clone()
    }

    /// Tasks in the order their units finished (success or failure).
    pub fn finished(&self) -> Vec<String> {
        self.probe.finished.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.probe.peak.load(Ordering::SeqCst)
    }

    pub fn merges_seen_by(&self, task: &str) -> Option<Vec<String>> {
        self.probe.merges_seen.lock().unwrap().get(task).cloned()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, request: WorkRequest) -> WorkFuture {
        let behaviour = self
            .behaviours
            .get(&request.name)
            .cloned()
            .unwrap_or_else(|| Behaviour::Succeed(ResultMap::new()));
        let probe = Arc::clone(&self.probe);

        probe
            .merges_seen
            .lock()
            .unwrap()
            .insert(request.name.clone(), request.merged.keys().cloned().collect());

        Box::pin(async move {
            probe.started.lock().unwrap().push(request.name.clone());
            let now = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            probe.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(Arc::clone(&probe));

            let result = match behaviour {
                Behaviour::Succeed(map) => Ok(map),
                Behaviour::Fail(msg) => Err(TaskError::failed(msg)),
                Behaviour::Sleep(duration, map) => {
                    tokio::time::sleep(duration).await;
                    Ok(map)
                }
                Behaviour::Panic(msg) => panic!("{msg}"),
            };

            probe.finished.lock().unwrap().push(request.name.clone());
            result
        })
    }
}
