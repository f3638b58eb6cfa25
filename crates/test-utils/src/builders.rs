#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use joindag::config::{ConfigSection, GraphFile, MergeSpec, RawGraphFile, TaskSpec};
use joindag::dag::{Plan, TaskDescriptor};
use serde_json::json;

/// Builder for `GraphFile` to simplify test setup.
pub struct GraphFileBuilder {
    raw: RawGraphFile,
}

impl GraphFileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawGraphFile {
                config: ConfigSection::default(),
                task: BTreeMap::new(),
                merge: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskSpec) -> Self {
        self.raw.task.insert(name.to_string(), task);
        self
    }

    pub fn with_merge(mut self, name: &str, cohort: &[&str]) -> Self {
        self.raw.merge.insert(
            name.to_string(),
            MergeSpec {
                cohort: cohort.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.raw.config.ceiling = ceiling;
        self
    }

    pub fn with_default_timeout(mut self, timeout: &str) -> Self {
        self.raw.config.default_timeout = Some(timeout.to_string());
        self
    }

    pub fn raw(self) -> RawGraphFile {
        self.raw
    }

    pub fn build(self) -> GraphFile {
        GraphFile::try_from(self.raw).expect("Failed to build valid graph file from builder")
    }
}

impl Default for GraphFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskSpec {
                cmd: cmd.to_string(),
                after: vec![],
                priority: None,
                timeout: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.task.priority = Some(priority);
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

/// Plan from `(id, deps)` pairs, in the given order, with empty payloads.
pub fn plan_of(tasks: &[(&str, &[&str])]) -> Plan {
    tasks.iter().fold(Plan::new(), |plan, (id, deps)| {
        plan.task(TaskDescriptor::new(*id, json!({})).after_all(deps.iter().copied()))
    })
}

/// Descriptor with an empty payload and the given timeout.
pub fn task_with_timeout(id: &str, deps: &[&str], timeout: Duration) -> TaskDescriptor {
    TaskDescriptor::new(id, json!({}))
        .after_all(deps.iter().copied())
        .with_timeout(timeout)
}
