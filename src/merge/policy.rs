// src/merge/policy.rs

//! Key-by-key merge policy for cohort results.
//!
//! For each top-level key, in absorption order:
//!
//! - list + list: concatenate.
//! - map + map: shallow union, later keys win.
//! - anything else: the later value overwrites and, unless both values are
//!   equal, a [`Conflict`] is recorded naming both writers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::ResultMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCategory {
    /// The two values have different JSON types.
    TypeMismatch,
    /// Same scalar type, different value.
    ValueMismatch,
}

impl ConflictCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictCategory::TypeMismatch => "type_mismatch",
            ConflictCategory::ValueMismatch => "value_mismatch",
        }
    }
}

/// A disagreement between two cohort members on one key.
///
/// Conflicts are data: the merge still produces a result, and nothing
/// resolves a conflict except an explicit `resolve_conflict` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Position in the merged result's conflict list.
    pub id: usize,
    pub category: ConflictCategory,
    /// Previous writer, then the overwriting source.
    pub participants: Vec<String>,
    pub key: String,
    pub detail: String,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Folds per-source result maps into one.
#[derive(Debug, Default)]
pub struct MergeAccumulator {
    data: ResultMap,
    /// Last source that wrote each key.
    writers: HashMap<String, String>,
    conflicts: Vec<Conflict>,
}

impl MergeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, source: &str, result: &ResultMap) {
        for (key, incoming) in result {
            let previous_writer = self
                .writers
                .insert(key.clone(), source.to_string())
                .unwrap_or_default();

            let Some(existing) = self.data.get_mut(key) else {
                self.data.insert(key.clone(), incoming.clone());
                continue;
            };

            match (existing, incoming) {
                (Value::Array(current), Value::Array(more)) => {
                    current.extend(more.iter().cloned());
                }
                (Value::Object(current), Value::Object(more)) => {
                    for (inner_key, value) in more {
                        current.insert(inner_key.clone(), value.clone());
                    }
                }
                (existing, incoming) if *existing == *incoming => {}
                (existing, incoming) => {
                    let category = if same_kind(existing, incoming) {
                        ConflictCategory::ValueMismatch
                    } else {
                        ConflictCategory::TypeMismatch
                    };
                    let detail = format!(
                        "`{key}`: {existing} from '{previous_writer}' overwritten by {incoming} from '{source}'"
                    );
                    debug!(key = %key, category = category.as_str(), "merge conflict");

                    self.conflicts.push(Conflict {
                        id: self.conflicts.len(),
                        category,
                        participants: vec![previous_writer, source.to_string()],
                        key: key.clone(),
                        detail,
                        resolution: None,
                        resolved_at: None,
                    });
                    *existing = incoming.clone();
                }
            }
        }
    }

    pub fn data(&self) -> &ResultMap {
        &self.data
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn finish(self) -> (ResultMap, Vec<Conflict>) {
        (self.data, self.conflicts)
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}
