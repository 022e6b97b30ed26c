//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment overrides.
//! Secrets (store key, graph token, OpenAI key) are only ever taken from the
//! environment. The resolved [`Config`] is passed explicitly to every
//! component; nothing downstream reads the environment itself.
//!
//! ```toml
//! [store]
//! backend = "postgrest"
//! url = "https://example.supabase.co"
//! table = "pages"
//!
//! [source]
//! kind = "graph"
//! graph = "my-graph"
//! backup_path = "./data/pages.json"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [sync]
//! concurrency = 4
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_STORE_URL: &str = "PAGESYNC_STORE_URL";
pub const ENV_STORE_KEY: &str = "PAGESYNC_STORE_KEY";
pub const ENV_EMBEDDING_MODEL: &str = "PAGESYNC_EMBEDDING_MODEL";
pub const ENV_SOURCE_ENDPOINT: &str = "PAGESYNC_SOURCE_ENDPOINT";
pub const ENV_SOURCE_GRAPH: &str = "PAGESYNC_SOURCE_GRAPH";
pub const ENV_SOURCE_TOKEN: &str = "PAGESYNC_SOURCE_TOKEN";
pub const ENV_PAGE_SIZE: &str = "PAGESYNC_PAGE_SIZE";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Base URL of the REST store (storeUrl).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(skip)]
    pub key: Option<Secret>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Database file for the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: None,
            key: None,
            table: default_table(),
            key_column: default_key_column(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            path: None,
        }
    }
}

fn default_store_backend() -> String {
    "postgrest".to_string()
}
fn default_table() -> String {
    "pages".to_string()
}
fn default_key_column() -> String {
    "uid".to_string()
}
fn default_page_size() -> usize {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: String,
    #[serde(default = "default_source_endpoint")]
    pub endpoint: String,
    /// Graph identifier on the query API.
    #[serde(default)]
    pub graph: Option<String>,
    #[serde(skip)]
    pub token: Option<Secret>,
    /// Saved query result to read when `kind = "file"`.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Where to keep a copy of the raw fetch, if anywhere.
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            endpoint: default_source_endpoint(),
            graph: None,
            token: None,
            file: None,
            backup_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_source_kind() -> String {
    "graph".to_string()
}
fn default_source_endpoint() -> String {
    "https://api.roamresearch.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(skip)]
    pub api_key: Option<Secret>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            endpoint: default_embedding_endpoint(),
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Upper bound on in-flight embedding and store calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// Read the config file (if given), apply process environment overrides,
/// and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => Config::default(),
    };
    apply_env(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Overlay environment values onto `config`. `lookup` abstracts the
/// environment so callers (and tests) can supply their own.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(ENV_STORE_URL) {
        config.store.url = Some(url);
    }
    if let Some(key) = get(ENV_STORE_KEY) {
        config.store.key = Some(Secret::new(key));
    }
    if let Some(model) = get(ENV_EMBEDDING_MODEL) {
        config.embedding.model = model;
    }
    if let Some(endpoint) = get(ENV_SOURCE_ENDPOINT) {
        config.source.endpoint = endpoint;
    }
    if let Some(graph) = get(ENV_SOURCE_GRAPH) {
        config.source.graph = Some(graph);
    }
    if let Some(token) = get(ENV_SOURCE_TOKEN) {
        config.source.token = Some(Secret::new(token));
    }
    if let Some(size) = get(ENV_PAGE_SIZE) {
        config.store.page_size = size
            .trim()
            .parse()
            .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_PAGE_SIZE, size))?;
    }
    if let Some(key) = get(ENV_OPENAI_KEY) {
        config.embedding.api_key = Some(Secret::new(key));
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    if config.store.page_size == 0 {
        bail!("store.page_size must be > 0");
    }
    if config.sync.concurrency == 0 {
        bail!("sync.concurrency must be > 0");
    }

    match config.store.backend.as_str() {
        "postgrest" => {
            if config.store.url.is_none() {
                bail!("store.url (or {}) is required for the postgrest backend", ENV_STORE_URL);
            }
        }
        "sqlite" => {
            if config.store.path.is_none() {
                bail!("store.path is required for the sqlite backend");
            }
        }
        other => bail!(
            "Unknown store backend: '{}'. Must be postgrest or sqlite.",
            other
        ),
    }

    match config.source.kind.as_str() {
        "graph" => {
            if config.source.graph.is_none() {
                bail!("source.graph (or {}) is required for kind 'graph'", ENV_SOURCE_GRAPH);
            }
        }
        "file" => {
            if config.source.file.is_none() {
                bail!("source.file is required for kind 'file'");
            }
        }
        other => bail!("Unknown source kind: '{}'. Must be graph or file.", other),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or hash.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    Ok(())
}
