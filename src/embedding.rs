//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`OpenAIEmbedder`]** — calls the OpenAI embeddings API with retry and backoff.
//! - **[`HashEmbedder`]** — deterministic FNV-1a bag-of-words vectors; no network.
//! - **[`DisabledEmbedder`]** — always fails; every upsert is reported as failed.
//!
//! Also provides [`vec_to_blob`] / [`blob_to_vec`] for storing vectors as
//! SQLite BLOBs.
//!
//! # Retry Strategy
//!
//! The OpenAI embedder uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{EmbeddingConfig, Secret};
use crate::error::SyncError;

/// Text → fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SyncError>;
}

// ============ Disabled Provider ============

/// Used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, SyncError> {
        Err(SyncError::Embedding(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with one input per request. Requires an API
/// key in the resolved config (`OPENAI_API_KEY`).
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Secret,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Returns an error if no API key was resolved or the HTTP client cannot
    /// be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(key) => key.clone(),
            None => bail!("OPENAI_API_KEY environment variable not set"),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, SyncError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| SyncError::Embedding(e.to_string()))?;
                        return parse_openai_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = SyncError::Embedding(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    ));

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(SyncError::Embedding(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            SyncError::Embedding("embedding failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SyncError> {
        let vector = self.request(text).await?;
        check_dims(&vector, self.dims)?;
        Ok(vector)
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, SyncError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            SyncError::Embedding("invalid OpenAI response: missing data[0].embedding".to_string())
        })?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                SyncError::Embedding("invalid OpenAI response: non-numeric component".to_string())
            })
        })
        .collect()
}

fn check_dims(vector: &[f32], dims: usize) -> Result<(), SyncError> {
    if vector.len() != dims {
        return Err(SyncError::Embedding(format!(
            "expected {}-dim vector, got {}",
            dims,
            vector.len()
        )));
    }
    Ok(())
}

// ============ Hash Provider ============

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Deterministic, non-semantic embedder.
///
/// Each lowercase alphanumeric token hashes (FNV-1a) to one dimension and
/// adds ±1 there; the result is L2-normalized. Titles with the same tokens
/// get the same vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();
        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dims as u64) as usize;
            v[index] += if hash >> 63 == 1 { 1.0 } else { -1.0 };
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "fnv1a-hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SyncError> {
        Ok(self.embed_sync(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"hash"` | [`HashEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "hash" => Ok(Box::new(HashEmbedder::new(config.dims))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn parse_response_takes_first_embedding() {
        let json = serde_json::json!({
            "data": [{ "index": 0, "embedding": [0.5, -1.0, 2.0] }],
            "model": "text-embedding-3-small"
        });
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn parse_response_rejects_malformed_payloads() {
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
        assert!(parse_openai_response(&serde_json::json!({ "data": [] })).is_err());
        let bad = serde_json::json!({ "data": [{ "embedding": ["x"] }] });
        assert!(parse_openai_response(&bad).is_err());
    }

    #[test]
    fn dims_mismatch_is_an_embedding_error() {
        assert!(check_dims(&[1.0, 2.0], 2).is_ok());
        assert!(matches!(
            check_dims(&[1.0], 2),
            Err(SyncError::Embedding(_))
        ));
    }

    #[test]
    fn hash_embedder_is_deterministic_and_normalized() {
        let e = HashEmbedder::new(64);
        let a = e.embed_sync("Project Alpha");
        let b = e.embed_sync("project   alpha");
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_ne!(a, e.embed_sync("Project Beta"));
    }

    #[test]
    fn hash_embedder_empty_text_is_zero_vector() {
        let v = HashEmbedder::new(8).embed_sync("");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn disabled_embedder_always_fails() {
        let err = DisabledEmbedder.embed("anything").await.unwrap_err();
        assert!(matches!(err, SyncError::Embedding(_)));
    }

    #[test]
    fn openai_requires_api_key() {
        let cfg = EmbeddingConfig::default();
        assert!(OpenAIEmbedder::new(&cfg).is_err());
        assert!(create_embedder(&cfg).is_err());
    }

    #[test]
    fn create_embedder_dispatch() {
        let mut cfg = EmbeddingConfig {
            provider: "hash".into(),
            dims: 32,
            ..EmbeddingConfig::default()
        };
        assert_eq!(create_embedder(&cfg).unwrap().dims(), 32);
        cfg.provider = "disabled".into();
        assert_eq!(create_embedder(&cfg).unwrap().model_name(), "disabled");
        cfg.provider = "nope".into();
        assert!(create_embedder(&cfg).is_err());
    }
}
