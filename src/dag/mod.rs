// src/dag/mod.rs

//! Task graph and dependency scheduling.
//!
//! - [`plan`] holds the planner-facing input: task descriptors and merge
//!   point declarations.
//! - [`graph`] is the immutable dependency graph built from a plan, with
//!   cycle and dangling-reference analysis.
//! - [`frontier`] tracks per-run state and decides which tasks are ready,
//!   blocked or unsatisfiable.
//! - [`scheduler`] drives a plan to completion in bounded batches.
//! - [`context`] holds the execution context and the final report.

pub mod context;
pub mod frontier;
pub mod graph;
pub mod plan;
pub mod scheduler;

pub use context::{BlockedTask, ExecutionContext, ExecutionResult};
pub use frontier::Frontier;
pub use graph::TaskGraph;
pub use plan::{MergePoint, Plan, TaskDescriptor};
pub use scheduler::Scheduler;
