//! SQLite-backed page store.
//!
//! One table, keyed by `uid`. Vectors are stored as little-endian f32 BLOBs
//! (see [`vec_to_blob`](crate::embedding::vec_to_blob)).
//!
//! ```sql
//! CREATE TABLE pages (
//!     uid TEXT PRIMARY KEY,
//!     title TEXT NOT NULL,
//!     embedding BLOB NOT NULL,
//!     dims INTEGER NOT NULL,
//!     updated_at INTEGER NOT NULL
//! )
//! ```

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use super::PageStore;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::SyncError;
use crate::models::{EmbeddingRecord, PageRecord};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Stored vector for `key`, if the row exists.
    pub async fn vector(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = sqlx::query_scalar("SELECT embedding FROM pages WHERE uid = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(blob.map(|b| blob_to_vec(&b)))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PageStore for SqliteStore {
    fn label(&self) -> String {
        "sqlite:pages".to_string()
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pages (
                uid TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dims INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<PageRecord>, SyncError> {
        let rows = sqlx::query("SELECT uid, title FROM pages ORDER BY uid LIMIT ? OFFSET ?")
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::store_read(offset, e))?;

        Ok(rows
            .iter()
            .map(|row| PageRecord::new(row.get::<String, _>("uid"), row.get::<String, _>("title")))
            .collect())
    }

    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), SyncError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO pages (uid, title, embedding, dims, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                title = excluded.title,
                embedding = excluded.embedding,
                dims = excluded.dims,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.key)
        .bind(&record.title)
        .bind(vec_to_blob(&record.vector))
        .bind(record.vector.len() as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::store_write(&record.key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM pages WHERE uid = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::store_write(key, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpsertKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_is_idempotent_and_upsert_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::connect(&tmp.path().join("db").join("pages.sqlite"))
            .await
            .unwrap();
        store.init().await.unwrap();
        store.init().await.unwrap();

        let mut rec = EmbeddingRecord {
            key: "p1".into(),
            title: "Alpha".into(),
            vector: vec![0.25, -0.5],
            kind: UpsertKind::New,
        };
        store.upsert(&rec).await.unwrap();
        rec.title = "Alpha 2".into();
        rec.vector = vec![1.0, 2.0, 3.0];
        store.upsert(&rec).await.unwrap();

        let page = store.read_page(0, 10).await.unwrap();
        assert_eq!(page, vec![PageRecord::new("p1", "Alpha 2")]);
        assert_eq!(store.vector("p1").await.unwrap(), Some(vec![1.0, 2.0, 3.0]));

        store.delete("p1").await.unwrap();
        store.delete("p1").await.unwrap();
        assert!(store.read_page(0, 10).await.unwrap().is_empty());
        store.close().await;
    }

    #[tokio::test]
    async fn read_before_init_is_a_store_read_error() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::connect(&tmp.path().join("pages.sqlite"))
            .await
            .unwrap();
        let err = store.read_page(0, 10).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
