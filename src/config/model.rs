// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration::parse_duration;
use crate::dag::{MergePoint, Plan, TaskDescriptor};
use crate::lifecycle::ManagerConfig;

/// Graph file exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [config]
/// ceiling = 2
/// default_timeout = "30s"
///
/// [task.fetch]
/// cmd = "echo '{\"pages\": [1]}'"
///
/// [task.report]
/// cmd = "echo done"
/// after = ["fetch"]
///
/// [merge.pages]
/// cohort = ["fetch"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawGraphFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All tasks from `[task.<id>]`, keyed by descriptor id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskSpec>,

    /// Merge points from `[merge.<id>]`.
    #[serde(default)]
    pub merge: BTreeMap<String, MergeSpec>,
}

/// Validated graph file. Construct through `GraphFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct GraphFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskSpec>,
    pub merge: BTreeMap<String, MergeSpec>,
}

impl GraphFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        task: BTreeMap<String, TaskSpec>,
        merge: BTreeMap<String, MergeSpec>,
    ) -> Self {
        Self {
            config,
            task,
            merge,
        }
    }

    /// Task-manager settings derived from `[config]`.
    ///
    /// Durations were checked during validation, so parse failures fall back
    /// to the defaults here.
    pub fn manager_config(&self) -> ManagerConfig {
        let defaults = ManagerConfig::default();
        let c = &self.config;
        ManagerConfig {
            ceiling: c.ceiling,
            default_timeout: c
                .default_timeout
                .as_deref()
                .and_then(|s| parse_duration(s).ok()),
            monitor_interval: parse_duration(&c.monitor_interval)
                .unwrap_or(defaults.monitor_interval),
            retention: parse_duration(&c.retention).unwrap_or(defaults.retention),
            worker_pool_size: c.effective_worker_pool_size(),
        }
    }

    /// Convert the file into the plan consumed by the scheduler.
    ///
    /// Each task's payload is `{"cmd": <cmd>}`.
    pub fn plan(&self) -> Plan {
        let tasks = self
            .task
            .iter()
            .map(|(id, spec)| {
                let mut desc =
                    TaskDescriptor::new(id.clone(), serde_json::json!({ "cmd": spec.cmd }))
                        .after_all(spec.after.iter().cloned());
                desc.priority = spec.priority;
                desc.timeout = spec.timeout_duration();
                desc
            })
            .collect();

        let merge_points = self
            .merge
            .iter()
            .map(|(id, spec)| MergePoint::new(id.clone(), spec.cohort.iter().cloned()))
            .collect();

        Plan {
            tasks,
            merge_points,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of tasks admitted at once (and batch size).
    #[serde(default = "default_ceiling")]
    pub ceiling: usize,

    /// Timeout applied to tasks that do not set their own, e.g. `"30s"`.
    #[serde(default)]
    pub default_timeout: Option<String>,

    /// How often the background monitor samples resources and reaps records.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: String,

    /// How long finished records stay in the registry.
    #[serde(default = "default_retention")]
    pub retention: String,

    /// Size of the worker pool used for executor calls.
    ///
    /// If `None`, `max(ceiling, 4)` is used.
    #[serde(default)]
    pub worker_pool_size: Option<usize>,
}

fn default_ceiling() -> usize {
    4
}

fn default_monitor_interval() -> String {
    "5s".to_string()
}

fn default_retention() -> String {
    "1h".to_string()
}

impl ConfigSection {
    pub fn effective_worker_pool_size(&self) -> usize {
        self.worker_pool_size.unwrap_or_else(|| self.ceiling.max(4))
    }
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
            default_timeout: None,
            monitor_interval: default_monitor_interval(),
            retention: default_retention(),
            worker_pool_size: None,
        }
    }
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    /// Shell command run by the command executor.
    pub cmd: String,

    /// Dependencies: this task waits until every task listed here completed.
    #[serde(default)]
    pub after: Vec<String>,

    /// Lower runs first when more tasks are ready than the ceiling allows.
    #[serde(default)]
    pub priority: Option<i64>,

    /// Per-task timeout, e.g. `"500ms"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

impl TaskSpec {
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.as_deref().and_then(|s| parse_duration(s).ok())
    }
}

/// `[merge.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeSpec {
    /// Tasks whose results are joined at this merge point.
    pub cohort: Vec<String>,
}
