//! In-memory [`PageStore`] for tests and dry experiments.
//!
//! Rows live in a `BTreeMap` behind `std::sync::RwLock`, so paging is in key
//! order. Individual keys can be marked to reject writes.

use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::PageStore;
use crate::error::SyncError;
use crate::models::{EmbeddingRecord, PageRecord, Snapshot};

struct StoredPage {
    title: String,
    vector: Vec<f32>,
}

/// In-memory page store.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<String, StoredPage>>,
    failing_keys: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows with empty vectors.
    pub fn with_pages<K, T>(pages: impl IntoIterator<Item = (K, T)>) -> Self
    where
        K: Into<String>,
        T: Into<String>,
    {
        let store = Self::new();
        {
            let mut rows = store.write_rows();
            for (k, t) in pages {
                rows.insert(
                    k.into(),
                    StoredPage {
                        title: t.into(),
                        vector: Vec::new(),
                    },
                );
            }
        }
        store
    }

    /// Make every upsert or delete of `key` fail with a store write error.
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.failing_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into());
    }

    /// Let previously failing keys be written again.
    pub fn clear_failing_writes(&self) {
        self.failing_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Current contents as a snapshot, in key order.
    pub fn snapshot(&self) -> Snapshot {
        self.read_rows()
            .iter()
            .map(|(k, p)| (k.clone(), p.title.clone()))
            .collect()
    }

    pub fn vector(&self, key: &str) -> Option<Vec<f32>> {
        self.read_rows().get(key).map(|p| p.vector.clone())
    }

    pub fn len(&self) -> usize {
        self.read_rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_rows().is_empty()
    }

    fn read_rows(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredPage>> {
        self.rows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_rows(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredPage>> {
        self.rows.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_writable(&self, key: &str) -> Result<(), SyncError> {
        let failing = self.failing_keys.read().unwrap_or_else(|e| e.into_inner());
        if failing.contains(key) {
            return Err(SyncError::store_write(key, "write rejected"));
        }
        Ok(())
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    fn label(&self) -> String {
        "memory".to_string()
    }

    async fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<PageRecord>, SyncError> {
        Ok(self
            .read_rows()
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(k, p)| PageRecord::new(k.clone(), p.title.clone()))
            .collect())
    }

    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), SyncError> {
        self.check_writable(&record.key)?;
        self.write_rows().insert(
            record.key.clone(),
            StoredPage {
                title: record.title.clone(),
                vector: record.vector.clone(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SyncError> {
        self.check_writable(key)?;
        self.write_rows().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpsertKind;

    fn record(key: &str, title: &str) -> EmbeddingRecord {
        EmbeddingRecord {
            key: key.into(),
            title: title.into(),
            vector: vec![1.0, 0.0],
            kind: UpsertKind::New,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_title_and_vector() {
        let store = MemoryStore::with_pages([("a", "old")]);
        store.upsert(&record("a", "new")).await.unwrap();
        assert_eq!(store.snapshot().get("a"), Some("new"));
        assert_eq!(store.vector("a"), Some(vec![1.0, 0.0]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn paging_is_in_key_order() {
        let store = MemoryStore::with_pages([("c", "3"), ("a", "1"), ("b", "2")]);
        let page = store.read_page(1, 5).await.unwrap();
        let keys: Vec<_> = page.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert!(store.read_page(3, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_keys_reject_writes() {
        let store = MemoryStore::with_pages([("a", "1")]);
        store.fail_writes_for("a");
        assert!(store.delete("a").await.is_err());
        assert!(store.upsert(&record("a", "2")).await.is_err());
        assert_eq!(store.snapshot().get("a"), Some("1"));
        store.delete("missing").await.unwrap();

        store.clear_failing_writes();
        store.upsert(&record("a", "2")).await.unwrap();
        assert_eq!(store.snapshot().get("a"), Some("2"));
    }
}
