//! Apply engine: upserts and deletes against the store.
//!
//! The two halves are independent and work on disjoint key sets. Each item
//! is attempted on its own; a failure is logged and counted, never
//! propagated. Every item produces one log line with key, title and outcome.

use futures::stream::{self, StreamExt};

use crate::models::{EmbeddingRecord, ItemOutcome, PageRecord, UpsertKind};
use crate::report::{FailureStage, ItemFailure, Tally};
use crate::store::PageStore;

/// Upsert every record by key. Returns the items that failed.
pub async fn apply_upserts(
    store: &dyn PageStore,
    records: Vec<EmbeddingRecord>,
    concurrency: usize,
    tally: &Tally,
) -> Vec<ItemFailure> {
    stream::iter(records)
        .map(|record| async move {
            match store.upsert(&record).await {
                Ok(()) => {
                    let outcome = match record.kind {
                        UpsertKind::New => ItemOutcome::Created,
                        UpsertKind::Changed => ItemOutcome::Updated,
                    };
                    tracing::info!(key = %record.key, title = %record.title, "{}", outcome);
                    tally.record(outcome);
                    None
                }
                Err(e) => {
                    tracing::warn!(key = %record.key, title = %record.title, error = %e, "failed");
                    tally.record(ItemOutcome::Failed);
                    Some(ItemFailure {
                        key: record.key,
                        title: record.title,
                        stage: FailureStage::Upsert,
                        error: e.to_string(),
                    })
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|failure| async move { failure })
        .collect()
        .await
}

/// Delete every page by key. `title` is the sink's title, used for logging.
pub async fn apply_deletes(
    store: &dyn PageStore,
    pages: Vec<PageRecord>,
    concurrency: usize,
    tally: &Tally,
) -> Vec<ItemFailure> {
    stream::iter(pages)
        .map(|page| async move {
            match store.delete(&page.key).await {
                Ok(()) => {
                    tracing::info!(key = %page.key, title = %page.title, "{}", ItemOutcome::Deleted);
                    tally.record(ItemOutcome::Deleted);
                    None
                }
                Err(e) => {
                    tracing::warn!(key = %page.key, title = %page.title, error = %e, "failed");
                    tally.record(ItemOutcome::Failed);
                    Some(ItemFailure {
                        key: page.key,
                        title: page.title,
                        stage: FailureStage::Delete,
                        error: e.to_string(),
                    })
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|failure| async move { failure })
        .collect()
        .await
}
