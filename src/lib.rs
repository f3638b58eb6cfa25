// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod lifecycle;
pub mod logging;
pub mod merge;
pub mod progress;
pub mod store;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{graph_warnings, load_and_validate, GraphFile};
use crate::dag::{ExecutionResult, Scheduler, TaskGraph};
use crate::exec::CommandExecutor;
use crate::lifecycle::TaskManager;
use crate::progress::TracingSink;
use crate::store::{JsonLinesStore, NullStore, OutcomeStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - graph file loading and validation
/// - the task manager (with its monitor) and the command executor
/// - the scheduler and the optional JSON-lines store
/// - Ctrl-C handling
///
/// Returns `Ok(true)` when every task completed.
pub async fn run(args: CliArgs) -> Result<bool> {
    let graph_path = PathBuf::from(&args.graph);
    let graph_file = load_and_validate(&graph_path)
        .with_context(|| format!("loading graph file {}", graph_path.display()))?;

    for warning in graph_warnings(&graph_file) {
        warn!("{warning}");
    }

    if args.dry_run {
        print_dry_run(&graph_file);
        return Ok(true);
    }

    let mut manager_config = graph_file.manager_config();
    if let Some(ceiling) = args.ceiling {
        manager_config.ceiling = usize::try_from(ceiling).unwrap_or(usize::MAX);
    }
    let ceiling = manager_config.ceiling;

    let manager = TaskManager::builder(manager_config)
        .progress(Arc::new(TracingSink))
        .build();
    manager.start_monitor();

    let store: Arc<dyn OutcomeStore> = match args.output.as_deref() {
        Some(path) => Arc::new(JsonLinesStore::new(path)),
        None => Arc::new(NullStore),
    };

    let mut scheduler = Scheduler::new(manager.clone(), Arc::new(CommandExecutor::new()))
        .with_store(store);
    if let Some(session) = args.session {
        scheduler = scheduler.with_session(session);
    }

    let plan = graph_file.plan();
    info!(session = %scheduler.session_id(), tasks = plan.tasks.len(), "graph loaded");

    let result = tokio::select! {
        result = scheduler.run(&plan, ceiling) => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            warn!("interrupted; shutting down");
            manager.shutdown().await;
            return Ok(false);
        }
    };

    print_summary(&result);
    manager.shutdown().await;

    Ok(result.is_success())
}

fn print_summary(result: &ExecutionResult) {
    let ctx = &result.context;

    println!("joindag session {}", result.session_id);
    for (i, round) in result.rounds.iter().enumerate() {
        println!("  round {}: {}", i + 1, round.join(", "));
    }
    println!();
    println!("completed ({}):", ctx.completed.len());
    for outcome in &ctx.completed {
        println!("  - {}", outcome.name);
    }
    if !ctx.failed.is_empty() {
        println!("failed ({}):", ctx.failed.len());
        for outcome in &ctx.failed {
            match &outcome.error {
                Some(err) => println!("  - {} [{}]: {err}", outcome.name, outcome.status),
                None => println!("  - {} [{}]", outcome.name, outcome.status),
            }
        }
    }
    if !result.blocked.is_empty() {
        println!("blocked ({}):", result.blocked.len());
        for task in &result.blocked {
            println!("  - {} (after {})", task.id, task.failed_ancestor);
        }
    }
    if let Some(err) = result.error() {
        println!("unsatisfiable ({}): {err}", result.unsatisfiable.len());
    }

    for merged in ctx.merged_results.values() {
        println!();
        print!("{}", merged.render_report());
    }
}

/// Print tasks, dependencies, merge points, topological order and cycles.
fn print_dry_run(file: &GraphFile) {
    let plan = file.plan();
    let graph = TaskGraph::new(&plan.tasks);

    println!("joindag dry-run");
    println!("  config.ceiling = {}", file.config.ceiling);
    println!(
        "  config.worker_pool_size = {}",
        file.config.effective_worker_pool_size()
    );
    if let Some(ref t) = file.config.default_timeout {
        println!("  config.default_timeout = {t}");
    }
    println!();

    println!("tasks ({}):", file.task.len());
    for (name, task) in file.task.iter() {
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(priority) = task.priority {
            println!("      priority: {priority}");
        }
        if let Some(ref timeout) = task.timeout {
            println!("      timeout: {timeout}");
        }
    }

    if !file.merge.is_empty() {
        println!();
        println!("merge points ({}):", file.merge.len());
        for (name, merge) in file.merge.iter() {
            println!("  - {name}: {:?}", merge.cohort);
        }
    }

    println!();
    match graph.topological_order() {
        Ok(order) => println!("topological order: {}", order.join(" -> ")),
        Err(node) => println!("topological order: none (cycle through '{node}')"),
    }
    for cycle in graph.cycles() {
        println!("cycle: {}", cycle.join(" -> "));
    }
    for (task, dep) in graph.missing_dependencies() {
        println!("unknown dependency: {task} -> {dep}");
    }

    debug!("dry-run complete (no execution)");
}
