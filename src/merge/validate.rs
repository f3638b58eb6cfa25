// src/merge/validate.rs

//! Structural checks on a merged result.
//!
//! Issues are returned as data; nothing here fails a run.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::merge::result::MergedResult;

/// Keys and values the structural checks look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRules {
    /// List of case entries; each may carry a status field.
    pub cases_key: String,
    /// Declared number of cases.
    pub total_key: String,
    pub status_key: String,
    /// Status value that counts as completed.
    pub completed_status: String,
    /// List of action entries.
    pub actions_key: String,
    /// Discriminant every action entry must carry.
    pub action_type_key: String,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            cases_key: "test_cases".to_string(),
            total_key: "total_tests".to_string(),
            status_key: "status".to_string(),
            completed_status: "completed".to_string(),
            actions_key: "actions".to_string(),
            action_type_key: "action_type".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// The merge produced no data at all.
    NoMergedData,
    CompletedExceedsTotal { completed: u64, total: u64 },
    MissingActionType { index: usize },
    UnresolvedConflicts { count: usize },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NoMergedData => write!(f, "no merged data available"),
            ValidationIssue::CompletedExceedsTotal { completed, total } => write!(
                f,
                "completed cases ({completed}) exceed declared total ({total})"
            ),
            ValidationIssue::MissingActionType { index } => {
                write!(f, "action #{index} is missing its type discriminant")
            }
            ValidationIssue::UnresolvedConflicts { count } => {
                write!(f, "{count} conflict(s) remain unresolved")
            }
        }
    }
}

/// Validate with the default rules.
pub fn validate(merged: &MergedResult) -> Vec<ValidationIssue> {
    validate_with(merged, &ValidationRules::default())
}

pub fn validate_with(merged: &MergedResult, rules: &ValidationRules) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if merged.data.is_empty() {
        issues.push(ValidationIssue::NoMergedData);
        return issues;
    }

    if let Some(cases) = merged.data.get(&rules.cases_key) {
        let completed = cases
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        entry.get(&rules.status_key).and_then(Value::as_str)
                            == Some(rules.completed_status.as_str())
                    })
                    .count() as u64
            })
            .unwrap_or(0);
        let total = merged
            .data
            .get(&rules.total_key)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if completed > total {
            issues.push(ValidationIssue::CompletedExceedsTotal { completed, total });
        }
    }

    if let Some(Value::Array(actions)) = merged.data.get(&rules.actions_key) {
        for (index, action) in actions.iter().enumerate() {
            let typed = match action.get(&rules.action_type_key) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            if !typed {
                issues.push(ValidationIssue::MissingActionType { index });
            }
        }
    }

    let unresolved = merged.unresolved_conflicts();
    if unresolved > 0 {
        issues.push(ValidationIssue::UnresolvedConflicts { count: unresolved });
    }

    issues
}
