// src/store.rs

//! Persistence hand-off for terminal outcomes and merged results.
//!
//! The scheduler emits plain data records; durable storage is the store's
//! business. Session and task identifiers are opaque strings here.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::merge::MergedResult;
use crate::types::TaskOutcome;

pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

pub trait OutcomeStore: Send + Sync {
    fn record_outcome<'a>(&'a self, session: &'a str, outcome: &'a TaskOutcome) -> StoreFuture<'a>;

    fn record_merge<'a>(&'a self, session: &'a str, merged: &'a MergedResult) -> StoreFuture<'a>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl OutcomeStore for NullStore {
    fn record_outcome<'a>(&'a self, _session: &'a str, _outcome: &'a TaskOutcome) -> StoreFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn record_merge<'a>(&'a self, _session: &'a str, _merged: &'a MergedResult) -> StoreFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Keeps records in memory; handy for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    outcomes: Mutex<Vec<(String, TaskOutcome)>>,
    merges: Mutex<Vec<(String, MergedResult)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<(String, TaskOutcome)> {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn merges(&self) -> Vec<(String, MergedResult)> {
        self.merges
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl OutcomeStore for MemoryStore {
    fn record_outcome<'a>(&'a self, session: &'a str, outcome: &'a TaskOutcome) -> StoreFuture<'a> {
        Box::pin(async move {
            self.outcomes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((session.to_string(), outcome.clone()));
            Ok(())
        })
    }

    fn record_merge<'a>(&'a self, session: &'a str, merged: &'a MergedResult) -> StoreFuture<'a> {
        Box::pin(async move {
            self.merges
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((session.to_string(), merged.clone()));
            Ok(())
        })
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredRecord<'a> {
    Outcome {
        session: &'a str,
        outcome: &'a TaskOutcome,
    },
    Merge {
        session: &'a str,
        merged: &'a MergedResult,
    },
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    /// Serializes appends so lines never interleave.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonLinesStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &StoredRecord<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("serializing store record")?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("appending to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

impl OutcomeStore for JsonLinesStore {
    fn record_outcome<'a>(&'a self, session: &'a str, outcome: &'a TaskOutcome) -> StoreFuture<'a> {
        Box::pin(async move { self.append(&StoredRecord::Outcome { session, outcome }).await })
    }

    fn record_merge<'a>(&'a self, session: &'a str, merged: &'a MergedResult) -> StoreFuture<'a> {
        Box::pin(async move { self.append(&StoredRecord::Merge { session, merged }).await })
    }
}
