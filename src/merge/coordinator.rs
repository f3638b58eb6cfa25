// src/merge/coordinator.rs

//! Cohort bookkeeping for merge points.
//!
//! A cohort is declared with its member task ids, receives outcomes through
//! [`MergeCoordinator::collect`] and is consumed by
//! [`MergeCoordinator::merge`] once every member is accounted for: it either
//! reported an outcome (success or not) or was abandoned by the scheduler.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::MergeError;
use crate::merge::policy::MergeAccumulator;
use crate::merge::result::MergedResult;
use crate::types::{ResultMap, TaskOutcome};

#[derive(Debug)]
struct Arrival {
    source: String,
    outcome: TaskOutcome,
}

#[derive(Debug)]
struct Cohort {
    members: Vec<String>,
    /// In arrival order.
    arrivals: Vec<Arrival>,
    abandoned: BTreeSet<String>,
}

impl Cohort {
    fn is_member(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }

    fn waiting(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| {
                !self.abandoned.contains(*m) && !self.arrivals.iter().any(|a| &a.source == *m)
            })
            .cloned()
            .collect()
    }
}

/// Collects cohort outcomes and merges them.
///
/// The cohort table is behind one lock and each cohort behind its own, so
/// collection for one cohort never waits on another.
#[derive(Debug, Default)]
pub struct MergeCoordinator {
    cohorts: Mutex<HashMap<String, Arc<Mutex<Cohort>>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MergeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn cohort(&self, cohort_id: &str) -> Result<Arc<Mutex<Cohort>>, MergeError> {
        lock(&self.cohorts)
            .get(cohort_id)
            .cloned()
            .ok_or_else(|| MergeError::UnknownCohort(cohort_id.to_string()))
    }

    pub fn declare<I, S>(&self, cohort_id: impl Into<String>, members: I) -> Result<(), MergeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cohort_id = cohort_id.into();
        let mut unique: Vec<String> = Vec::new();
        for member in members.into_iter().map(Into::into) {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        let members = unique;

        let mut cohorts = lock(&self.cohorts);
        if cohorts.contains_key(&cohort_id) {
            return Err(MergeError::AlreadyDeclared(cohort_id));
        }
        debug!(cohort = %cohort_id, members = ?members, "cohort declared");
        cohorts.insert(
            cohort_id,
            Arc::new(Mutex::new(Cohort {
                members,
                arrivals: Vec::new(),
                abandoned: BTreeSet::new(),
            })),
        );
        Ok(())
    }

    /// Record `source`'s terminal outcome for `cohort_id`.
    ///
    /// A second outcome from the same source replaces the first and counts
    /// as a new arrival.
    pub fn collect(
        &self,
        cohort_id: &str,
        source: &str,
        outcome: TaskOutcome,
    ) -> Result<(), MergeError> {
        let cohort = self.cohort(cohort_id)?;
        let mut cohort = lock(&cohort);
        if !cohort.is_member(source) {
            return Err(MergeError::NotAMember {
                cohort: cohort_id.to_string(),
                member: source.to_string(),
            });
        }

        if let Some(pos) = cohort.arrivals.iter().position(|a| a.source == source) {
            warn!(cohort = %cohort_id, task = %source, "replacing earlier outcome");
            cohort.arrivals.remove(pos);
        }
        cohort.abandoned.remove(source);
        cohort.arrivals.push(Arrival {
            source: source.to_string(),
            outcome,
        });
        debug!(cohort = %cohort_id, task = %source, "outcome collected");
        Ok(())
    }

    /// Count `member` as resolved without an outcome.
    ///
    /// No-op if the member already reported.
    pub fn abandon(&self, cohort_id: &str, member: &str) -> Result<(), MergeError> {
        let cohort = self.cohort(cohort_id)?;
        let mut cohort = lock(&cohort);
        if !cohort.is_member(member) {
            return Err(MergeError::NotAMember {
                cohort: cohort_id.to_string(),
                member: member.to_string(),
            });
        }
        if !cohort.arrivals.iter().any(|a| a.source == member) {
            cohort.abandoned.insert(member.to_string());
            debug!(cohort = %cohort_id, task = %member, "member abandoned");
        }
        Ok(())
    }

    /// Declared cohorts that list `member`, sorted.
    pub fn cohorts_containing(&self, member: &str) -> Vec<String> {
        let cohorts = lock(&self.cohorts);
        let mut ids: Vec<String> = cohorts
            .iter()
            .filter(|(_, cohort)| lock(cohort).is_member(member))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Members that have neither reported nor been abandoned.
    pub fn waiting_on(&self, cohort_id: &str) -> Result<Vec<String>, MergeError> {
        let cohort = self.cohort(cohort_id)?;
        let waiting = lock(&cohort).waiting();
        Ok(waiting)
    }

    pub fn is_ready(&self, cohort_id: &str) -> Result<bool, MergeError> {
        Ok(self.waiting_on(cohort_id)?.is_empty())
    }

    /// Cohorts ready to merge, sorted.
    pub fn ready_cohorts(&self) -> Vec<String> {
        let cohorts = lock(&self.cohorts);
        let mut ids: Vec<String> = cohorts
            .iter()
            .filter(|(_, cohort)| lock(cohort).waiting().is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Successful per-source results, `order` first (in that order), then
    /// the remaining sources in arrival order.
    pub fn prioritize(
        &self,
        cohort_id: &str,
        order: &[&str],
    ) -> Result<Vec<(String, ResultMap)>, MergeError> {
        let cohort = self.cohort(cohort_id)?;
        let cohort = lock(&cohort);

        let successful: Vec<(&str, &ResultMap)> = cohort
            .arrivals
            .iter()
            .filter_map(|a| {
                a.outcome
                    .result
                    .as_ref()
                    .filter(|_| a.outcome.is_success())
                    .map(|r| (a.source.as_str(), r))
            })
            .collect();

        let mut ranked: Vec<(String, ResultMap)> = Vec::with_capacity(successful.len());
        for wanted in order {
            if let Some((source, result)) = successful.iter().find(|(s, _)| s == wanted) {
                ranked.push((source.to_string(), (*result).clone()));
            }
        }
        for (source, result) in &successful {
            if !order.contains(source) {
                ranked.push((source.to_string(), (*result).clone()));
            }
        }
        Ok(ranked)
    }

    /// Merge and consume a ready cohort.
    ///
    /// Fails with `CohortIncomplete` while a member is still outstanding;
    /// the cohort stays declared in that case.
    pub fn merge(&self, cohort_id: &str) -> Result<MergedResult, MergeError> {
        let cohort = {
            let mut cohorts = lock(&self.cohorts);
            let cohort = cohorts
                .get(cohort_id)
                .cloned()
                .ok_or_else(|| MergeError::UnknownCohort(cohort_id.to_string()))?;
            let waiting = lock(&cohort).waiting();
            if !waiting.is_empty() {
                return Err(MergeError::CohortIncomplete {
                    cohort: cohort_id.to_string(),
                    waiting,
                });
            }
            cohorts.remove(cohort_id);
            cohort
        };
        let cohort = lock(&cohort);

        let mut acc = MergeAccumulator::new();
        let mut participants = Vec::new();
        let mut failed = Vec::new();
        for arrival in &cohort.arrivals {
            match (&arrival.outcome.result, arrival.outcome.is_success()) {
                (Some(result), true) => {
                    acc.absorb(&arrival.source, result);
                    participants.push(arrival.source.clone());
                }
                (None, true) => participants.push(arrival.source.clone()),
                (_, false) => failed.push(arrival.source.clone()),
            }
        }
        let (data, conflicts) = acc.finish();

        let merged = MergedResult {
            cohort_id: cohort_id.to_string(),
            merged_at: Utc::now(),
            participants,
            failed,
            abandoned: cohort.abandoned.iter().cloned().collect(),
            data,
            conflicts,
        };

        info!(
            cohort = %cohort_id,
            participants = merged.participants.len(),
            failed = merged.failed.len(),
            abandoned = merged.abandoned.len(),
            conflicts = merged.conflicts.len(),
            "cohort merged"
        );
        Ok(merged)
    }
}
