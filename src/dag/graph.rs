// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use crate::dag::plan::TaskDescriptor;

/// Internal node structure: the descriptor plus its dependency list.
#[derive(Debug, Clone)]
struct DagNode {
    /// Position in the input; used as the final scheduling tie-break.
    order: usize,
    descriptor: TaskDescriptor,
    /// Direct dependencies, in sorted order. May name unknown tasks.
    deps: Vec<String>,
}

/// In-memory view of a task graph keyed by descriptor id.
///
/// Unlike a validated config DAG this tolerates cycles and dangling
/// references; [`TaskGraph::cycles`] and [`TaskGraph::missing_dependencies`]
/// report them so the scheduler can explain why work stalled.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<String, DagNode>,
    order: Vec<String>,
}

impl TaskGraph {
    /// Build a graph from descriptors. Later duplicates of an id are ignored.
    pub fn new(tasks: &[TaskDescriptor]) -> Self {
        let mut nodes: HashMap<String, DagNode> = HashMap::new();
        let mut order = Vec::new();

        for task in tasks {
            if nodes.contains_key(&task.id) {
                warn!(task = %task.id, "duplicate task id in graph; keeping the first");
                continue;
            }
            nodes.insert(
                task.id.clone(),
                DagNode {
                    order: order.len(),
                    descriptor: task.clone(),
                    deps: task.dependencies.iter().cloned().collect(),
                },
            );
            order.push(task.id.clone());
        }

        Self { nodes, order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Task ids in input order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn descriptor(&self, name: &str) -> Option<&TaskDescriptor> {
        self.nodes.get(name).map(|n| &n.descriptor)
    }

    /// Position of the task in the input.
    pub fn order_of(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).map(|n| n.order)
    }

    /// Task id at the given input position.
    pub fn name_at(&self, order: usize) -> Option<&str> {
        self.order.get(order).map(|s| s.as_str())
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// `(task, dependency)` pairs where the dependency is not in the graph.
    pub fn missing_dependencies(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for name in self.order.iter() {
            for dep in self.dependencies_of(name) {
                if !self.nodes.contains_key(dep) {
                    missing.push((name.clone(), dep.clone()));
                }
            }
        }
        missing
    }

    /// Build a petgraph graph. Edge direction: dep -> task.
    fn to_petgraph(&self) -> DiGraphMap<&str, ()> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.order.iter() {
            graph.add_node(name.as_str());
        }

        for name in self.order.iter() {
            for dep in self.dependencies_of(name) {
                if self.nodes.contains_key(dep) {
                    graph.add_edge(dep.as_str(), name.as_str(), ());
                }
            }
        }

        graph
    }

    /// Strongly connected components that form a cycle (including
    /// self-dependencies), each listed in input order.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let graph = self.to_petgraph();

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.first().is_some_and(|n| graph.contains_edge(*n, *n))
            })
            .map(|scc| {
                let mut members: Vec<String> = scc.into_iter().map(str::to_string).collect();
                members.sort_by_key(|m| self.order_of(m).unwrap_or(usize::MAX));
                members
            })
            .collect();

        cycles.sort_by_key(|c| c.first().and_then(|m| self.order_of(m)).unwrap_or(usize::MAX));
        cycles
    }

    /// A topological order of the graph, or the id of a task on a cycle.
    pub fn topological_order(&self) -> Result<Vec<String>, String> {
        let graph = self.to_petgraph();
        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(cycle.node_id().to_string()),
        }
    }
}
