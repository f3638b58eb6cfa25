// src/dag/scheduler.rs

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dag::context::{ExecutionContext, ExecutionResult};
use crate::dag::frontier::Frontier;
use crate::dag::graph::TaskGraph;
use crate::dag::plan::{Plan, TaskDescriptor};
use crate::exec::{Executor, WorkRequest};
use crate::lifecycle::TaskManager;
use crate::merge::{validate, MergeCoordinator, MergedResult};
use crate::store::{NullStore, OutcomeStore};
use crate::types::TaskOutcome;

/// Drives one plan to completion in dependency order.
///
/// Each round dispatches up to `ceiling` ready tasks through the task
/// manager and waits for the whole batch before looking at the graph again.
/// After every round:
/// - completed tasks satisfy their dependents
/// - failed, cancelled or timed-out tasks block their dependents for good
/// - cohorts whose members are all accounted for are merged and published
///   to the execution context, visible to every later dispatch
///
/// The run ends when nothing is ready. Whatever is still pending is then
/// reported as blocked (a dependency failed) or unsatisfiable (a cycle, an
/// unknown dependency, or downstream of one).
pub struct Scheduler {
    manager: TaskManager,
    executor: Arc<dyn Executor>,
    store: Arc<dyn OutcomeStore>,
    session_id: String,
}

impl Scheduler {
    pub fn new(manager: TaskManager, executor: Arc<dyn Executor>) -> Self {
        Self {
            manager,
            executor,
            store: Arc::new(NullStore),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Emit every outcome and merged result to `store`.
    pub fn with_store(mut self, store: Arc<dyn OutcomeStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// Run `plan` with batches of at most `ceiling` tasks.
    ///
    /// The batch size is also capped by the manager's own ceiling. Per-task
    /// failures and graph-level problems are reported in the result, never
    /// as an `Err`.
    pub async fn run(&self, plan: &Plan, ceiling: usize) -> ExecutionResult {
        let graph = TaskGraph::new(&plan.tasks);
        let mut frontier = Frontier::new(&graph);
        let mut context = ExecutionContext::default();
        let coordinator = MergeCoordinator::new();

        for point in &plan.merge_points {
            if let Err(e) = coordinator.declare(point.id.clone(), point.cohort.iter().cloned()) {
                warn!(cohort = %point.id, error = %e, "ignoring merge point");
                continue;
            }
            // Members outside the graph will never report.
            for member in point.cohort.iter().filter(|m| !graph.contains(m)) {
                warn!(cohort = %point.id, task = %member, "merge point names an unknown task");
                let _ = coordinator.abandon(&point.id, member);
            }
        }

        let batch_size = ceiling.max(1).min(self.manager.ceiling());
        info!(
            session = %self.session_id,
            tasks = graph.len(),
            merge_points = plan.merge_points.len(),
            ceiling = batch_size,
            "starting graph run"
        );

        let mut rounds: Vec<Vec<String>> = Vec::new();
        loop {
            let batch = frontier.next_batch(batch_size);
            if batch.is_empty() {
                break;
            }

            let round = rounds.len() + 1;
            let ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();
            info!(round, tasks = ?ids, "dispatching batch");

            let merged = Arc::new(context.merged_results.clone());
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|desc| self.dispatch(desc, Arc::clone(&merged))),
            )
            .await;
            rounds.push(ids);

            for outcome in outcomes {
                frontier.resolve(&outcome.name, outcome.is_success());
                for cohort in coordinator.cohorts_containing(&outcome.name) {
                    if let Err(e) = coordinator.collect(&cohort, &outcome.name, outcome.clone()) {
                        warn!(cohort = %cohort, task = %outcome.name, error = %e, "could not collect outcome");
                    }
                }
                self.persist_outcome(&outcome).await;
                context.record(outcome);
            }

            // Blocked tasks count as resolved for their cohorts.
            for blocked in frontier.blocked() {
                abandon_member(&coordinator, &blocked.id);
            }
            self.publish_ready_merges(&coordinator, &mut context).await;
        }

        let blocked = frontier.blocked();
        let unsatisfiable = frontier.unsatisfiable();
        let stuck: HashSet<&str> = unsatisfiable.iter().map(String::as_str).collect();
        let cycles: Vec<Vec<String>> = graph
            .cycles()
            .into_iter()
            .filter(|cycle| cycle.iter().any(|t| stuck.contains(t.as_str())))
            .collect();

        for id in unsatisfiable.iter() {
            abandon_member(&coordinator, id);
        }
        self.publish_ready_merges(&coordinator, &mut context).await;

        for task in &blocked {
            warn!(task = %task.id, failed_ancestor = %task.failed_ancestor, "task blocked by failed dependency");
        }
        if !unsatisfiable.is_empty() {
            error!(
                pending = ?unsatisfiable,
                cycles = ?cycles,
                "dependencies unsatisfiable; stopping run"
            );
        }

        info!(
            session = %self.session_id,
            rounds = rounds.len(),
            completed = context.completed.len(),
            failed = context.failed.len(),
            blocked = blocked.len(),
            unsatisfiable = unsatisfiable.len(),
            merged = context.merged_results.len(),
            "graph run finished"
        );

        ExecutionResult {
            session_id: self.session_id.clone(),
            context,
            blocked,
            unsatisfiable,
            cycles,
            rounds,
        }
    }

    async fn dispatch(
        &self,
        desc: &TaskDescriptor,
        merged: Arc<BTreeMap<String, MergedResult>>,
    ) -> TaskOutcome {
        let request = WorkRequest {
            name: desc.id.clone(),
            payload: desc.payload.clone(),
            merged,
        };
        // `execute` itself runs on the worker pool, so a panicking or
        // blocking executor only affects its own task.
        let executor = Arc::clone(&self.executor);
        let work = async move { executor.execute(request).await };

        match self
            .manager
            .submit(desc.id.clone(), work, desc.timeout, Vec::new())
        {
            Ok(handle) => {
                debug!(task = %desc.id, task_id = %handle.task_id(), "task dispatched");
                handle.wait().await
            }
            Err(e) => {
                warn!(task = %desc.id, error = %e, "task rejected by task manager");
                TaskOutcome::rejected(desc.id.clone(), e)
            }
        }
    }

    async fn publish_ready_merges(
        &self,
        coordinator: &MergeCoordinator,
        context: &mut ExecutionContext,
    ) {
        for cohort in coordinator.ready_cohorts() {
            let merged = match coordinator.merge(&cohort) {
                Ok(merged) => merged,
                Err(e) => {
                    warn!(cohort = %cohort, error = %e, "merge failed");
                    continue;
                }
            };

            for issue in validate(&merged) {
                warn!(cohort = %cohort, issue = %issue, "merge validation issue");
            }
            if let Err(e) = self.store.record_merge(&self.session_id, &merged).await {
                warn!(cohort = %cohort, error = %format!("{e:#}"), "could not persist merged result");
            }
            context.publish_merge(merged);
        }
    }

    async fn persist_outcome(&self, outcome: &TaskOutcome) {
        if let Err(e) = self.store.record_outcome(&self.session_id, outcome).await {
            warn!(task = %outcome.name, error = %format!("{e:#}"), "could not persist outcome");
        }
    }
}

fn abandon_member(coordinator: &MergeCoordinator, member: &str) {
    for cohort in coordinator.cohorts_containing(member) {
        let _ = coordinator.abandon(&cohort, member);
    }
}
