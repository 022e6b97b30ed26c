//! Core data models used throughout page-sync.
//!
//! These types represent the pages, snapshots, and per-item outcomes that flow
//! through the reconciliation pipeline.

use std::collections::HashMap;
use std::fmt;

/// A page as seen by either side of the reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub key: String,
    pub title: String,
}

impl PageRecord {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
        }
    }
}

/// A complete key → title map for one side at one point in time.
///
/// Iteration follows first-insertion order. Inserting a key that is already
/// present replaces its title (last write wins) but keeps the key's original
/// position, so iteration order is reproducible for a given input sequence.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    index: HashMap<String, usize>,
    entries: Vec<PageRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key. Returns the previous title, if any.
    pub fn insert(&mut self, key: impl Into<String>, title: impl Into<String>) -> Option<String> {
        let key = key.into();
        let title = title.into();
        match self.index.get(&key).copied() {
            Some(pos) => Some(std::mem::replace(&mut self.entries[pos].title, title)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(PageRecord { key, title });
                None
            }
        }
    }

    /// Remove a key. Linear in the snapshot size.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.index.remove(key)?;
        let removed = self.entries.remove(pos);
        for entry in &self.entries[pos..] {
            if let Some(slot) = self.index.get_mut(&entry.key) {
                *slot -= 1;
            }
        }
        Some(removed.title)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&pos| self.entries[pos].title.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageRecord> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }
}

/// Snapshots compare as maps: order is not part of equality.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|e| other.get(&e.key) == Some(e.title.as_str()))
    }
}

impl Eq for Snapshot {}

impl<K: Into<String>, T: Into<String>> FromIterator<(K, T)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        snapshot.extend(iter);
        snapshot
    }
}

impl<K: Into<String>, T: Into<String>> Extend<(K, T)> for Snapshot {
    fn extend<I: IntoIterator<Item = (K, T)>>(&mut self, iter: I) {
        for (key, title) in iter {
            self.insert(key, title);
        }
    }
}

/// Why a key landed in the upsert set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    /// Key absent from the sink.
    New,
    /// Key present in the sink with a different title.
    Changed,
}

/// A page scheduled for upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertCandidate {
    pub key: String,
    pub title: String,
    pub kind: UpsertKind,
}

/// A page paired with the vector for its title, ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub key: String,
    pub title: String,
    pub vector: Vec<f32>,
    pub kind: UpsertKind,
}

/// Final outcome for one processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
    Deleted,
    Failed,
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemOutcome::Created => "created",
            ItemOutcome::Updated => "updated",
            ItemOutcome::Deleted => "deleted",
            ItemOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Phase of a single reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Fetching,
    Diffing,
    Enriching,
    Applying,
    Done,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Fetching => "fetching",
            RunPhase::Diffing => "diffing",
            RunPhase::Enriching => "enriching",
            RunPhase::Applying => "applying",
            RunPhase::Done => "done",
            RunPhase::Aborted => "aborted",
        };
        f.write_str(s)
    }
}
