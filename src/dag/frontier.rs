// src/dag/frontier.rs

//! Per-run scheduling state: which tasks are pending, in flight, executed
//! or failed, and which of the pending ones can still make progress.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::dag::context::BlockedTask;
use crate::dag::graph::TaskGraph;
use crate::dag::plan::TaskDescriptor;

/// Mutable frontier over an immutable [`TaskGraph`].
///
/// - `pending`: not yet dispatched (input positions, so iteration follows
///   input order).
/// - `in_flight`: dispatched in the current batch, awaiting an outcome.
/// - `executed`: completed successfully; satisfies dependents.
/// - `failed`: resolved without success; dependents are permanently blocked.
#[derive(Debug)]
pub struct Frontier<'g> {
    graph: &'g TaskGraph,
    pending: BTreeSet<usize>,
    in_flight: HashSet<String>,
    executed: HashSet<String>,
    failed: HashSet<String>,
}

impl<'g> Frontier<'g> {
    pub fn new(graph: &'g TaskGraph) -> Self {
        Self {
            graph,
            pending: (0..graph.len()).collect(),
            in_flight: HashSet::new(),
            executed: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Pending tasks whose dependencies have all completed, in dispatch
    /// order: ascending priority (unset last), then input order.
    pub fn ready(&self) -> Vec<&'g TaskDescriptor> {
        let graph = self.graph;
        let mut ready: Vec<(usize, &'g TaskDescriptor)> = self
            .pending
            .iter()
            .filter_map(|&idx| {
                let name = graph.name_at(idx)?;
                let satisfied = graph
                    .dependencies_of(name)
                    .iter()
                    .all(|dep| self.executed.contains(dep));
                if satisfied {
                    graph.descriptor(name).map(|d| (idx, d))
                } else {
                    None
                }
            })
            .collect();

        ready.sort_by_key(|(idx, desc)| (desc.priority.is_none(), desc.priority, *idx));
        ready.into_iter().map(|(_, desc)| desc).collect()
    }

    /// Take up to `ceiling` ready tasks and mark them in flight.
    pub fn next_batch(&mut self, ceiling: usize) -> Vec<&'g TaskDescriptor> {
        let batch: Vec<&'g TaskDescriptor> = self.ready().into_iter().take(ceiling.max(1)).collect();

        for desc in batch.iter() {
            if let Some(idx) = self.graph.order_of(&desc.id) {
                self.pending.remove(&idx);
            }
            self.in_flight.insert(desc.id.clone());
        }

        batch
    }

    /// Record the terminal outcome of an in-flight task.
    pub fn resolve(&mut self, name: &str, success: bool) {
        if !self.in_flight.remove(name) {
            debug!(task = %name, "resolve called for a task that was not in flight");
        }
        if success {
            self.executed.insert(name.to_string());
        } else {
            self.failed.insert(name.to_string());
        }
    }

    /// Pending task ids in input order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter_map(|&idx| self.graph.name_at(idx).map(str::to_string))
            .collect()
    }

    /// Pending tasks that can never run because an ancestor failed.
    pub fn blocked(&self) -> Vec<BlockedTask> {
        self.pending_ids()
            .into_iter()
            .filter_map(|id| {
                let mut visited = HashSet::new();
                self.failed_ancestor(&id, &mut visited)
                    .map(|failed_ancestor| BlockedTask { id, failed_ancestor })
            })
            .collect()
    }

    /// Pending tasks that are not blocked by a failure: they wait on a
    /// cycle, a task missing from the graph, or something downstream of one.
    pub fn unsatisfiable(&self) -> Vec<String> {
        let blocked: HashSet<String> = self.blocked().into_iter().map(|b| b.id).collect();
        self.pending_ids()
            .into_iter()
            .filter(|id| !blocked.contains(id))
            .collect()
    }

    /// Walk pending dependencies looking for a failed task.
    fn failed_ancestor(&self, name: &str, visited: &mut HashSet<String>) -> Option<String> {
        if !visited.insert(name.to_string()) {
            return None;
        }

        for dep in self.graph.dependencies_of(name) {
            if self.failed.contains(dep) {
                return Some(dep.clone());
            }
            let dep_pending = self
                .graph
                .order_of(dep)
                .is_some_and(|idx| self.pending.contains(&idx));
            if dep_pending {
                if let Some(found) = self.failed_ancestor(dep, visited) {
                    return Some(found);
                }
            }
        }

        None
    }
}
