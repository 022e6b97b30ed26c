//! PostgREST-backed page store (Supabase REST API).
//!
//! Requests, for table `pages` keyed by `uid`:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | read page | `GET /rest/v1/pages?select=uid,title&order=uid.asc&offset=N&limit=M` |
//! | upsert | `POST /rest/v1/pages?on_conflict=uid` + `Prefer: resolution=merge-duplicates` |
//! | delete | `DELETE /rest/v1/pages?uid=eq.<key>` |
//!
//! The store key is sent both as `apikey` and as a bearer token. The
//! vector column is `embedding` and must accept a JSON array (pgvector does).
//!
//! A non-success status is a soft failure reported in the response body; a
//! transport error is a hard failure. Both map to the same [`SyncError`]
//! variant.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;

use super::PageStore;
use crate::config::{Secret, StoreConfig};
use crate::error::SyncError;
use crate::models::{EmbeddingRecord, PageRecord};

pub struct PostgrestStore {
    client: reqwest::Client,
    base_url: String,
    key: Option<Secret>,
    table: String,
    key_column: String,
}

impl PostgrestStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("store.url required for the postgrest backend"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            table: config.table.clone(),
            key_column: config.key_column.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.key {
            Some(key) => req
                .header("apikey", key.expose())
                .bearer_auth(key.expose()),
            None => req,
        }
    }

    /// Map a non-success response to its error text.
    async fn check(response: Response) -> Result<Response, String> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(format!("{}: {}", status, extract_message(&body)))
    }
}

/// PostgREST error bodies look like `{"code": "...", "message": "..."}`.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[derive(Deserialize)]
struct Row {
    title: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
impl PageStore for PostgrestStore {
    fn label(&self) -> String {
        format!("postgrest:{}", self.table)
    }

    async fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<PageRecord>, SyncError> {
        let select = format!("{},title", self.key_column);
        let order = format!("{}.asc", self.key_column);
        let req = self.client.get(self.table_url()).query(&[
            ("select", select),
            ("order", order),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);

        let response = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| SyncError::store_read(offset, e))?;
        let response = Self::check(response)
            .await
            .map_err(|e| SyncError::store_read(offset, e))?;
        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| SyncError::store_read(offset, e))?;

        rows.into_iter()
            .map(|row| {
                let key = match row.rest.get(&self.key_column) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => {
                        return Err(SyncError::store_read(
                            offset,
                            format!("row missing '{}' column", self.key_column),
                        ))
                    }
                };
                Ok(PageRecord::new(key, row.title.unwrap_or_default()))
            })
            .collect()
    }

    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), SyncError> {
        let mut row = serde_json::Map::new();
        row.insert(self.key_column.clone(), record.key.clone().into());
        row.insert("title".to_string(), record.title.clone().into());
        row.insert("embedding".to_string(), serde_json::json!(record.vector));

        let req = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", self.key_column.as_str())])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&serde_json::Value::Array(vec![serde_json::Value::Object(row)]));

        let response = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| SyncError::store_write(&record.key, e))?;
        Self::check(response)
            .await
            .map_err(|e| SyncError::store_write(&record.key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SyncError> {
        let filter = format!("eq.{}", key);
        let req = self
            .client
            .delete(self.table_url())
            .query(&[(self.key_column.as_str(), filter.as_str())])
            .header("Prefer", "return=minimal");

        let response = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| SyncError::store_write(key, e))?;
        Self::check(response)
            .await
            .map_err(|e| SyncError::store_write(key, e))?;
        Ok(())
    }
}
