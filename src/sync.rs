//! Reconciliation run orchestration.
//!
//! Drives one batch run through its phases:
//!
//! ```text
//! Fetching ──▶ Diffing ──▶ Enriching ──▶ Applying ──▶ Done
//!    │            │
//!    └────────────┴──▶ Aborted   (source fetch or sink read failed)
//! ```
//!
//! Source and sink snapshots are read concurrently. Nothing is written until
//! both are complete. Once the diff exists the run always reaches `Done`;
//! item failures are counted in the [`RunReport`] and retried naturally by
//! the next run, since their keys are still out of sync.
//!
//! Runs must not overlap against the same table. That is left to whatever
//! schedules them.

use anyhow::Result;

use crate::apply::{apply_deletes, apply_upserts};
use crate::config::Config;
use crate::diff::{diff, DiffResult};
use crate::embedding::{create_embedder, Embedder};
use crate::enrich::enrich;
use crate::error::SyncError;
use crate::models::{ItemOutcome, PageRecord, RunPhase, Snapshot, UpsertKind};
use crate::report::{RunReport, Tally};
use crate::source::{build_source_snapshot, create_source, PageSource};
use crate::store::{create_store, read_sink_snapshot, PageStore};

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: usize,
    pub concurrency: usize,
    /// Compute and report the diff without embedding or writing.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            page_size: config.store.page_size,
            concurrency: config.sync.concurrency,
            dry_run,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            concurrency: 1,
            dry_run: false,
        }
    }
}

fn enter(phase: RunPhase) {
    tracing::debug!(phase = %phase, "entering phase");
}

/// Run one reconciliation against already-constructed collaborators.
///
/// Returns `Err` only for fatal errors (source fetch, sink read), in which
/// case the store has not been touched.
pub async fn reconcile(
    source: &dyn PageSource,
    store: &dyn PageStore,
    embedder: &dyn Embedder,
    options: &SyncOptions,
) -> Result<RunReport, SyncError> {
    enter(RunPhase::Fetching);
    let (fetched, sink) = tokio::join!(source.fetch(), read_sink_snapshot(store, options.page_size));
    let (fetched, sink) = match (fetched, sink) {
        (Ok(fetched), Ok(sink)) => (fetched, sink),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(phase = %RunPhase::Aborted, error = %e, "run aborted before any writes");
            return Err(e);
        }
    };
    let fetched_count = fetched.len();
    let source_snapshot = build_source_snapshot(fetched);
    tracing::info!(
        source = %source.label(),
        store = %store.label(),
        fetched = fetched_count,
        source_pages = source_snapshot.len(),
        sink_rows = sink.len(),
        "snapshots loaded"
    );

    enter(RunPhase::Diffing);
    let plan = diff(&source_snapshot, &sink);
    tracing::info!(
        new = plan.count(UpsertKind::New),
        changed = plan.count(UpsertKind::Changed),
        delete = plan.to_delete.len(),
        unchanged = plan.unchanged.len(),
        "diff computed"
    );

    let mut report = RunReport {
        phase: RunPhase::Done,
        dry_run: options.dry_run,
        source_pages: source_snapshot.len(),
        sink_rows: sink.len(),
        unchanged: plan.unchanged.len() as u64,
        created: 0,
        updated: 0,
        deleted: 0,
        failed: 0,
        failures: Vec::new(),
    };

    if options.dry_run {
        log_plan(&plan, &sink);
        report.created = plan.count(UpsertKind::New) as u64;
        report.updated = plan.count(UpsertKind::Changed) as u64;
        report.deleted = plan.to_delete.len() as u64;
        enter(RunPhase::Done);
        return Ok(report);
    }

    let DiffResult {
        to_upsert,
        to_delete,
        ..
    } = plan;
    let deletions = with_sink_titles(to_delete, &sink);
    let tally = Tally::new();

    enter(RunPhase::Enriching);
    let enriched = enrich(embedder, to_upsert, options.concurrency, &tally).await;

    enter(RunPhase::Applying);
    let (upsert_failures, delete_failures) = tokio::join!(
        apply_upserts(store, enriched.records, options.concurrency, &tally),
        apply_deletes(store, deletions, options.concurrency, &tally),
    );

    enter(RunPhase::Done);
    report.created = tally.get(ItemOutcome::Created);
    report.updated = tally.get(ItemOutcome::Updated);
    report.deleted = tally.get(ItemOutcome::Deleted);
    report.failed = tally.get(ItemOutcome::Failed);
    report.failures = enriched.failures;
    report.failures.extend(upsert_failures);
    report.failures.extend(delete_failures);
    Ok(report)
}

fn with_sink_titles(keys: Vec<String>, sink: &Snapshot) -> Vec<PageRecord> {
    keys.into_iter()
        .map(|key| {
            let title = sink.get(&key).unwrap_or_default().to_string();
            PageRecord { key, title }
        })
        .collect()
}

fn log_plan(plan: &DiffResult, sink: &Snapshot) {
    for c in &plan.to_upsert {
        let action = match c.kind {
            UpsertKind::New => "would create",
            UpsertKind::Changed => "would update",
        };
        tracing::info!(key = %c.key, title = %c.title, "{}", action);
    }
    for key in &plan.to_delete {
        tracing::info!(key = %key, title = %sink.get(key).unwrap_or_default(), "would delete");
    }
}

/// Build collaborators from `config`, run once, and print the summary.
pub async fn run_sync(config: &Config, dry_run: bool) -> Result<RunReport> {
    let source = create_source(&config.source)?;
    let store = create_store(&config.store).await?;
    let embedder = create_embedder(&config.embedding)?;
    let options = SyncOptions::from_config(config, dry_run);

    let report = reconcile(source.as_ref(), store.as_ref(), embedder.as_ref(), &options).await?;
    print_summary(&report);
    Ok(report)
}

pub fn print_summary(report: &RunReport) {
    if report.dry_run {
        println!("sync (dry-run)");
    } else {
        println!("sync");
    }
    println!("  source pages: {}", report.source_pages);
    println!("  store rows: {}", report.sink_rows);
    println!("  unchanged: {}", report.unchanged);
    println!("  created: {}", report.created);
    println!("  updated: {}", report.updated);
    println!("  deleted: {}", report.deleted);
    if !report.dry_run {
        println!("  failed: {}", report.failed);
    }
    if report.has_failures() {
        for f in &report.failures {
            println!("    {} {} ({}): {}", f.stage, f.key, f.title, f.error);
        }
    }
    println!("{}", report.phase);
}
