//! Upstream page sources and the source snapshot reader.
//!
//! A [`PageSource`] yields raw `(key, title)` pairs. [`build_source_snapshot`]
//! drops date-journal pages and folds the rest into a [`Snapshot`].
//!
//! Both built-in sources understand the graph query result shape:
//!
//! ```json
//! { "result": [ ["uid-1", "Page title"], ["uid-2", "Another page"] ] }
//! ```
//!
//! # Backup
//!
//! When `source.backup_path` is set, the raw response body is written there
//! before parsing. Backup failures are logged and otherwise ignored.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Secret, SourceConfig};
use crate::error::SyncError;
use crate::filter::is_date_journal;
use crate::models::Snapshot;

/// Datalog query selecting every titled page with its uid.
pub const PAGES_QUERY: &str = "[:find ?uid ?title :where [?e :node/title ?title] [?e :block/uid ?uid]]";

/// Produces the authoritative list of pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Short label for logs (e.g. `"graph:my-graph"`).
    fn label(&self) -> String;

    /// Fetch every page as `(key, title)`, in upstream order.
    async fn fetch(&self) -> Result<Vec<(String, String)>, SyncError>;
}

/// Fold raw pairs into the source snapshot.
///
/// Pairs whose key is a date-journal identifier are dropped. On duplicate
/// keys the last occurrence's title wins.
pub fn build_source_snapshot<I>(pairs: I) -> Snapshot
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut snapshot = Snapshot::new();
    let mut skipped = 0usize;
    for (key, title) in pairs {
        if is_date_journal(&key) {
            skipped += 1;
            continue;
        }
        if let Some(previous) = snapshot.insert(key.clone(), title) {
            tracing::debug!(key = %key, previous = %previous, "duplicate key in source; keeping last");
        }
    }
    tracing::debug!(pages = snapshot.len(), journal_pages = skipped, "built source snapshot");
    snapshot
}

/// Parse a query result body into `(key, title)` pairs.
///
/// Rows that are not `[string, string]` are skipped with a warning.
pub fn parse_query_result(body: &str) -> Result<Vec<(String, String)>, SyncError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SyncError::SourceFetch(format!("invalid query result JSON: {}", e)))?;

    let rows = json
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| SyncError::SourceFetch("query result missing 'result' array".to_string()))?;

    let mut pairs = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let pair = row.as_array().and_then(|cols| match cols.as_slice() {
            [key, title] => Some((key.as_str()?.to_string(), title.as_str()?.to_string())),
            _ => None,
        });
        match pair {
            Some(pair) => pairs.push(pair),
            None => tracing::warn!(row = i, value = %row, "skipping malformed result row"),
        }
    }
    Ok(pairs)
}

async fn write_backup(path: Option<&Path>, body: &str) {
    let Some(path) = path else {
        return;
    };
    let result = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await
    }
    .await;
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), bytes = body.len(), "wrote source backup"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not write source backup"),
    }
}

// ============ Graph API ============

/// Queries the graph backend API: `POST {endpoint}/api/graph/{graph}/q`.
pub struct GraphApiSource {
    client: reqwest::Client,
    endpoint: String,
    graph: String,
    token: Option<Secret>,
    backup_path: Option<PathBuf>,
}

impl GraphApiSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let graph = config
            .graph
            .clone()
            .ok_or_else(|| anyhow::anyhow!("source.graph required for the graph source"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            graph,
            token: config.token.clone(),
            backup_path: config.backup_path.clone(),
        })
    }

    fn query_url(&self) -> String {
        format!("{}/api/graph/{}/q", self.endpoint, self.graph)
    }
}

#[async_trait]
impl PageSource for GraphApiSource {
    fn label(&self) -> String {
        format!("graph:{}", self.graph)
    }

    async fn fetch(&self) -> Result<Vec<(String, String)>, SyncError> {
        let mut req = self
            .client
            .post(self.query_url())
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "query": PAGES_QUERY }));
        if let Some(token) = &self.token {
            // The API redirects to a peer host; X-Authorization survives the hop.
            let bearer = format!("Bearer {}", token.expose());
            req = req
                .header("Authorization", &bearer)
                .header("X-Authorization", &bearer);
        }

        let response = req
            .send()
            .await
            .map_err(|e| SyncError::SourceFetch(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::SourceFetch(e.to_string()))?;

        if !status.is_success() {
            return Err(SyncError::SourceFetch(format!(
                "graph query returned {}: {}",
                status, body
            )));
        }

        write_backup(self.backup_path.as_deref(), &body).await;
        parse_query_result(&body)
    }
}

// ============ File ============

/// Reads a previously saved query result from disk.
pub struct FileSource {
    path: PathBuf,
    backup_path: Option<PathBuf>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_path: None,
        }
    }

    pub fn with_backup(mut self, backup_path: Option<PathBuf>) -> Self {
        self.backup_path = backup_path;
        self
    }
}

#[async_trait]
impl PageSource for FileSource {
    fn label(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<Vec<(String, String)>, SyncError> {
        let body = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SyncError::SourceFetch(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        write_backup(self.backup_path.as_deref(), &body).await;
        parse_query_result(&body)
    }
}

/// Create the [`PageSource`] named by `config.kind`.
pub fn create_source(config: &SourceConfig) -> Result<Box<dyn PageSource>> {
    match config.kind.as_str() {
        "graph" => Ok(Box::new(GraphApiSource::new(config)?)),
        "file" => {
            let path = config
                .file
                .clone()
                .ok_or_else(|| anyhow::anyhow!("source.file required for the file source"))?;
            Ok(Box::new(
                FileSource::new(path).with_backup(config.backup_path.clone()),
            ))
        }
        other => anyhow::bail!("Unknown source kind: {}", other),
    }
}
