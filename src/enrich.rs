//! Embedding enrichment for the upsert set.
//!
//! One embedder call per candidate, with at most `concurrency` calls in
//! flight. Results come back in candidate order. A failed item is logged,
//! counted, and left out; the rest of the batch continues.

use futures::stream::{self, StreamExt};

use crate::embedding::Embedder;
use crate::models::{EmbeddingRecord, ItemOutcome, UpsertCandidate};
use crate::report::{FailureStage, ItemFailure, Tally};

#[derive(Debug, Default)]
pub struct EnrichOutput {
    pub records: Vec<EmbeddingRecord>,
    pub failures: Vec<ItemFailure>,
}

pub async fn enrich(
    embedder: &dyn Embedder,
    candidates: Vec<UpsertCandidate>,
    concurrency: usize,
    tally: &Tally,
) -> EnrichOutput {
    let results: Vec<_> = stream::iter(candidates)
        .map(|candidate| async move {
            let result = embedder.embed(&candidate.title).await;
            (candidate, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut out = EnrichOutput::default();
    for (candidate, result) in results {
        match result {
            Ok(vector) => out.records.push(EmbeddingRecord {
                key: candidate.key,
                title: candidate.title,
                vector,
                kind: candidate.kind,
            }),
            Err(e) => {
                tracing::warn!(
                    key = %candidate.key,
                    title = %candidate.title,
                    error = %e,
                    "failed"
                );
                tally.record(ItemOutcome::Failed);
                out.failures.push(ItemFailure {
                    key: candidate.key,
                    title: candidate.title,
                    stage: FailureStage::Embedding,
                    error: e.to_string(),
                });
            }
        }
    }
    out
}
