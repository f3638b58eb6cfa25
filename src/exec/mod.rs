// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] provides the `Executor` trait that the scheduler uses to
//!   turn a task payload into a unit of work, plus `FnExecutor` for
//!   synchronous (blocking) actions.
//! - [`pool`] is the bounded worker pool the task manager runs units on.
//! - [`command`] is the shell-command executor used by the binary.

pub mod backend;
pub mod command;
pub mod pool;

pub use backend::{Executor, FnExecutor, WorkFuture, WorkRequest};
pub use command::CommandExecutor;
pub use pool::WorkerPool;
