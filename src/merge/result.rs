// src/merge/result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::MergeError;
use crate::merge::policy::Conflict;
use crate::types::ResultMap;

/// Unified result of one merge point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub cohort_id: String,
    pub merged_at: DateTime<Utc>,
    /// Members whose results were merged, in absorption order.
    pub participants: Vec<String>,
    /// Members that ended without success.
    pub failed: Vec<String>,
    /// Members the scheduler gave up on (blocked or unsatisfiable).
    pub abandoned: Vec<String>,
    pub data: ResultMap,
    pub conflicts: Vec<Conflict>,
}

impl MergedResult {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn unresolved_conflicts(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.is_resolved()).count()
    }

    pub fn resolved_conflicts(&self) -> usize {
        self.conflicts.len() - self.unresolved_conflicts()
    }

    /// Tag conflict `id` with a resolution. Returns the resolution time.
    ///
    /// Resolving twice replaces the earlier resolution.
    pub fn resolve_conflict(
        &mut self,
        id: usize,
        resolution: impl Into<String>,
    ) -> Result<DateTime<Utc>, MergeError> {
        let conflict = self
            .conflicts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(MergeError::UnknownConflict(id))?;
        let now = Utc::now();
        conflict.resolution = Some(resolution.into());
        conflict.resolved_at = Some(now);
        Ok(now)
    }
}
