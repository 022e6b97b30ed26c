//! Per-run tallies and the final run report.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{ItemOutcome, RunPhase};

/// Running counts, safe to bump from concurrent item tasks.
#[derive(Debug, Default)]
pub struct Tally {
    created: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    failed: AtomicU64,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Created => &self.created,
            ItemOutcome::Updated => &self.updated,
            ItemOutcome::Deleted => &self.deleted,
            ItemOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, outcome: ItemOutcome) -> u64 {
        match outcome {
            ItemOutcome::Created => self.created.load(Ordering::Relaxed),
            ItemOutcome::Updated => self.updated.load(Ordering::Relaxed),
            ItemOutcome::Deleted => self.deleted.load(Ordering::Relaxed),
            ItemOutcome::Failed => self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Which step an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Embedding,
    Upsert,
    Delete,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Embedding => "embedding",
            FailureStage::Upsert => "upsert",
            FailureStage::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// An item skipped this run. Its key shows up again in the next diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub key: String,
    pub title: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of one reconciliation run that got past diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub phase: RunPhase,
    pub dry_run: bool,
    pub source_pages: usize,
    pub sink_rows: usize,
    pub unchanged: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub failed: u64,
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
