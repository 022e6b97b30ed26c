//! End-to-end reconciliation through the library API.
//!
//! Uses in-process sources, stores and embedders so each scenario can
//! control exactly which calls succeed.

use async_trait::async_trait;
use page_sync::embedding::{Embedder, HashEmbedder};
use page_sync::error::SyncError;
use page_sync::models::{EmbeddingRecord, PageRecord, RunPhase, Snapshot};
use page_sync::report::FailureStage;
use page_sync::source::PageSource;
use page_sync::store::{read_sink_snapshot, MemoryStore, PageStore, SqliteStore};
use page_sync::sync::{reconcile, SyncOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

// ─── Test doubles ───────────────────────────────────────────────────

struct VecSource(Vec<(String, String)>);

impl VecSource {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, t)| (k.to_string(), t.to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl PageSource for VecSource {
    fn label(&self) -> String {
        "vec".into()
    }
    async fn fetch(&self) -> Result<Vec<(String, String)>, SyncError> {
        Ok(self.0.clone())
    }
}

/// Fails for one specific title, counts every call.
struct FlakyEmbedder {
    bad_title: String,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text == self.bad_title {
            Err(SyncError::Embedding("429 Too Many Requests".into()))
        } else {
            Ok(vec![1.0, 2.0, 3.0])
        }
    }
}

/// Wraps a store, recording page requests and failing reads on demand.
struct RecordingStore {
    inner: MemoryStore,
    reads: Mutex<Vec<usize>>,
    fail_read_at_offset: Option<usize>,
    writes: AtomicUsize,
}

impl RecordingStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
            fail_read_at_offset: None,
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageStore for RecordingStore {
    fn label(&self) -> String {
        "recording".into()
    }
    async fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<PageRecord>, SyncError> {
        self.reads.lock().unwrap().push(offset);
        if self.fail_read_at_offset == Some(offset) {
            return Err(SyncError::StoreRead {
                offset,
                message: "connection reset".into(),
            });
        }
        self.inner.read_page(offset, limit).await
    }
    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), SyncError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(record).await
    }
    async fn delete(&self, key: &str) -> Result<(), SyncError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

fn numbered(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| (format!("page-{:05}", i), format!("Title {}", i)))
        .collect()
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_new_unchanged_deleted() {
    let store = MemoryStore::with_pages([("p1", "Alpha"), ("p3", "Gamma")]);
    let source = VecSource::new(&[("p1", "Alpha"), ("p2", "Beta")]);

    let report = reconcile(&source, &store, &HashEmbedder::new(8), &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.failed, 0);

    let expected: Snapshot = vec![("p1", "Alpha"), ("p2", "Beta")].into_iter().collect();
    assert_eq!(store.snapshot(), expected);
    assert_eq!(store.vector("p2").map(|v| v.len()), Some(8));
}

#[tokio::test]
async fn scenario_b_journal_pages_are_invisible() {
    let store = MemoryStore::with_pages([("p1", "Alpha")]);
    let source = VecSource::new(&[("01-02-2023", "journal"), ("p1", "Alpha")]);

    let report = reconcile(&source, &store, &HashEmbedder::new(8), &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.source_pages, 1);
    assert_eq!(report.created + report.updated + report.deleted, 0);
    assert!(!store.snapshot().contains_key("01-02-2023"));
}

#[tokio::test]
async fn scenario_c_paged_sink_read() {
    let store = MemoryStore::with_pages(numbered(2400));
    let recording = RecordingStore::new(store);

    let snapshot = read_sink_snapshot(&recording, 1000).await.unwrap();
    assert_eq!(snapshot.len(), 2400);
    assert_eq!(*recording.reads.lock().unwrap(), vec![0, 1000, 2000]);
}

#[tokio::test]
async fn scenario_d_embedding_failure_is_item_local() {
    let store = MemoryStore::with_pages([("old-1", "Old"), ("old-2", "Older"), ("keep", "Same")]);
    let source = VecSource::new(&[
        ("keep", "Same"),
        ("n1", "First"),
        ("n2", "Broken"),
        ("n3", "Third"),
    ]);
    let embedder = FlakyEmbedder {
        bad_title: "Broken".into(),
        calls: AtomicUsize::new(0),
    };

    let report = reconcile(&source, &store, &embedder, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.created, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "n2");
    assert_eq!(report.failures[0].stage, FailureStage::Embedding);

    let keys: Vec<String> = store.snapshot().keys().map(str::to_string).collect();
    assert_eq!(keys, vec!["keep", "n1", "n3"]);
}

#[tokio::test]
async fn failed_item_is_retried_next_run() {
    let store = MemoryStore::new();
    let source = VecSource::new(&[("a", "A"), ("b", "B")]);
    store.fail_writes_for("b");

    let first = reconcile(&source, &store, &HashEmbedder::new(4), &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.failed, 1);
    assert_eq!(first.failures[0].stage, FailureStage::Upsert);

    assert!(!store.snapshot().contains_key("b"));

    store.clear_failing_writes();
    let second = reconcile(&source, &store, &HashEmbedder::new(4), &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(second.created, 1);
    assert_eq!(second.unchanged, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(store.snapshot().get("b"), Some("B"));
    assert_eq!(store.vector("b").map(|v| v.len()), Some(4));
}

#[tokio::test]
async fn store_read_failure_aborts_before_writes() {
    let mut store = RecordingStore::new(MemoryStore::with_pages(numbered(25)));
    store.fail_read_at_offset = Some(10);
    let source = VecSource::new(&[("new", "New page")]);
    let options = SyncOptions {
        page_size: 10,
        ..SyncOptions::default()
    };

    let err = reconcile(&source, &store, &HashEmbedder::new(4), &options)
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.inner.len(), 25);
}

#[tokio::test]
async fn concurrent_run_converges_to_source() {
    let mut sink = numbered(300);
    sink.truncate(200);
    for (_, title) in sink.iter_mut().take(50) {
        title.push_str(" (stale)");
    }
    sink.push(("orphan".into(), "Gone upstream".into()));
    let store = MemoryStore::with_pages(sink);

    let source = VecSource(numbered(300));
    let options = SyncOptions {
        page_size: 64,
        concurrency: 8,
        dry_run: false,
    };

    let report = reconcile(&source, &store, &HashEmbedder::new(16), &options)
        .await
        .unwrap();

    assert_eq!(report.created, 100);
    assert_eq!(report.updated, 50);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.unchanged, 150);
    assert_eq!(report.failed, 0);

    let expected: Snapshot = numbered(300).into_iter().collect();
    assert_eq!(store.snapshot(), expected);
}

#[tokio::test]
async fn sqlite_store_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::connect(&tmp.path().join("pages.sqlite"))
        .await
        .unwrap();
    store.init().await.unwrap();

    let embedder = HashEmbedder::new(8);
    let options = SyncOptions {
        page_size: 2,
        ..SyncOptions::default()
    };

    let v1 = VecSource::new(&[("a", "Alpha"), ("b", "Beta"), ("c", "Gamma")]);
    let first = reconcile(&v1, &store, &embedder, &options).await.unwrap();
    assert_eq!(first.created, 3);

    let v2 = VecSource::new(&[("a", "Alpha"), ("b", "Beta prime"), ("d", "Delta")]);
    let second = reconcile(&v2, &store, &embedder, &options).await.unwrap();
    assert_eq!(second.created, 1);
    assert_eq!(second.updated, 1);
    assert_eq!(second.deleted, 1);
    assert_eq!(second.unchanged, 1);

    let sink = read_sink_snapshot(&store, 2).await.unwrap();
    let expected: Snapshot = vec![("a", "Alpha"), ("b", "Beta prime"), ("d", "Delta")]
        .into_iter()
        .collect();
    assert_eq!(sink, expected);
    assert_eq!(
        store.vector("b").await.unwrap(),
        Some(embedder.embed_sync("Beta prime"))
    );
    store.close().await;
}
