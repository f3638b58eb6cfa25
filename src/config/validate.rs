// src/config/validate.rs

use crate::config::duration::parse_duration;
use crate::config::model::{GraphFile, RawGraphFile};
use crate::dag::TaskGraph;
use crate::errors::{JoindagError, Result};

impl TryFrom<RawGraphFile> for GraphFile {
    type Error = JoindagError;

    fn try_from(raw: RawGraphFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_graph(&raw)?;
        Ok(GraphFile::new_unchecked(raw.config, raw.task, raw.merge))
    }
}

fn validate_raw_graph(cfg: &RawGraphFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_timeouts(cfg)?;
    validate_merge_points(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawGraphFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(JoindagError::ConfigError(
            "graph must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawGraphFile) -> Result<()> {
    let c = &cfg.config;

    if c.ceiling == 0 {
        return Err(JoindagError::ConfigError(
            "[config].ceiling must be >= 1 (got 0)".to_string(),
        ));
    }

    if c.worker_pool_size == Some(0) {
        return Err(JoindagError::ConfigError(
            "[config].worker_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }

    check_duration("[config].monitor_interval", &c.monitor_interval)?;
    check_duration("[config].retention", &c.retention)?;
    if let Some(ref t) = c.default_timeout {
        check_duration("[config].default_timeout", t)?;
    }

    if parse_duration(&c.monitor_interval).is_ok_and(|d| d.is_zero()) {
        return Err(JoindagError::ConfigError(
            "[config].monitor_interval must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_task_timeouts(cfg: &RawGraphFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if let Some(ref t) = task.timeout {
            check_duration(&format!("[task.{name}].timeout"), t)?;
        }
    }
    Ok(())
}

fn validate_merge_points(cfg: &RawGraphFile) -> Result<()> {
    for (name, merge) in cfg.merge.iter() {
        if merge.cohort.is_empty() {
            return Err(JoindagError::ConfigError(format!(
                "merge point '{name}' has an empty cohort"
            )));
        }
        for member in merge.cohort.iter() {
            if !cfg.task.contains_key(member) {
                return Err(JoindagError::ConfigError(format!(
                    "merge point '{name}' has unknown cohort member '{member}'"
                )));
            }
        }
    }
    Ok(())
}

fn check_duration(field: &str, value: &str) -> Result<()> {
    parse_duration(value)
        .map(|_| ())
        .map_err(|e| JoindagError::ConfigError(format!("{field}: {e}")))
}

/// Non-fatal structural findings about a validated graph file.
///
/// Cycles and references to unknown tasks are allowed through validation
/// because the scheduler reports them precisely at run time; this lists them
/// up front for logging and `--dry-run`.
pub fn graph_warnings(cfg: &GraphFile) -> Vec<String> {
    let plan = cfg.plan();
    let graph = TaskGraph::new(&plan.tasks);

    let mut warnings = Vec::new();

    for (task, dep) in graph.missing_dependencies() {
        warnings.push(format!("task '{task}' depends on unknown task '{dep}'"));
    }

    for cycle in graph.cycles() {
        warnings.push(format!(
            "dependency cycle detected between tasks {cycle:?}"
        ));
    }

    warnings
}
