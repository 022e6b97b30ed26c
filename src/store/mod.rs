//! Page store abstraction and the sink snapshot reader.
//!
//! The [`PageStore`] trait is the whole store boundary: paged reads of
//! `(key, title)`, upsert by key, delete by key. Backends:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | PostgREST (Supabase-style REST) | [`postgrest`] | production |
//! | SQLite via sqlx | [`sqlite`] | local / offline |
//! | In-memory | [`memory`] | tests |

pub mod memory;
pub mod postgrest;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::SyncError;
use crate::models::{EmbeddingRecord, PageRecord, Snapshot};

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;
pub use sqlite::SqliteStore;

/// Storage backend holding one row per page: key, title, vector.
///
/// Implementations must be `Send + Sync`; the apply engine may issue
/// several writes concurrently.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Short label for logs (e.g. `"postgrest:pages"`).
    fn label(&self) -> String;

    /// Create whatever schema the backend needs. Idempotent.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Read up to `limit` rows starting at `offset`, projected to key and
    /// title. Row order must be stable across calls.
    async fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<PageRecord>, SyncError>;

    /// Insert the row, or fully replace title and vector if the key exists.
    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), SyncError>;

    /// Remove the row with this key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), SyncError>;
}

/// Read every row into a [`Snapshot`].
///
/// Requests pages of `page_size` starting at offset 0 and stops after the
/// first page shorter than `page_size` (including an empty one). Any page
/// failure fails the whole read; a partial snapshot is never returned.
pub async fn read_sink_snapshot(
    store: &dyn PageStore,
    page_size: usize,
) -> Result<Snapshot, SyncError> {
    if page_size == 0 {
        return Err(SyncError::store_read(0, "page size must be > 0"));
    }

    let mut snapshot = Snapshot::new();
    let mut offset = 0usize;
    let mut pages = 0usize;

    loop {
        let rows = store.read_page(offset, page_size).await?;
        pages += 1;
        let n = rows.len();
        tracing::debug!(offset, rows = n, "read sink page");

        snapshot.extend(rows.into_iter().map(|r| (r.key, r.title)));

        if n < page_size {
            break;
        }
        offset += page_size;
    }

    tracing::debug!(pages, rows = snapshot.len(), "built sink snapshot");
    Ok(snapshot)
}

/// Create the [`PageStore`] named by `config.backend`.
pub async fn create_store(config: &StoreConfig) -> Result<Box<dyn PageStore>> {
    match config.backend.as_str() {
        "postgrest" => Ok(Box::new(PostgrestStore::new(config)?)),
        "sqlite" => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("store.path required for the sqlite backend"))?;
            Ok(Box::new(SqliteStore::connect(path).await?))
        }
        other => bail!("Unknown store backend: {}", other),
    }
}
