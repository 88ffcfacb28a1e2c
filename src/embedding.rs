//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; ingestion leaves embeddings
//!   null for later backfill.
//! - **[`GeminiProvider`]** — Google Generative Language embeddings with
//!   retrieval task types (documents vs queries are embedded differently).
//! - **[`OpenAiProvider`]** — the OpenAI `/v1/embeddings` endpoint.
//!
//! Also provides the vector utilities shared by storage and search:
//! [`vec_to_blob`] / [`blob_to_vec`] for little-endian f32 BLOB storage and
//! [`cosine_similarity`] for scoring.
//!
//! # Retry Strategy
//!
//! Remote providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{EmbeddingConfig, EMBEDDING_DIMS};

/// Trait for embedding providers.
///
/// Documents and queries take different task types on providers that
/// support them, so the two paths are distinct methods. Every returned
/// vector has exactly [`EMBEDDING_DIMS`] components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of corpus passages, one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider cannot
/// be initialized (missing API key environment variable).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "gemini" => Ok(Box::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"`. Ingestion stores chunks
/// with null embeddings; query-path callers get a descriptive failure.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Gemini Provider ============

/// Embedding provider using the Google Generative Language API.
///
/// Batches passages through `:batchEmbedContents` with task type
/// `RETRIEVAL_DOCUMENT`; queries go through `:embedContent` with
/// `RETRIEVAL_QUERY`. The asymmetric task types matter for retrieval
/// quality on this model family.
pub struct GeminiProvider {
    model: String,
    api_key: String,
    config: EmbeddingConfig,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            config: config.clone(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:{}?key={}",
            self.model, method, self.api_key
        )
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": t }] },
                    "taskType": "RETRIEVAL_DOCUMENT",
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let json = post_with_retry(
            &self.config,
            &self.endpoint("batchEmbedContents"),
            &[],
            &body,
            "Gemini",
        )
        .await?;
        let embeddings = parse_gemini_batch_response(&json)?;
        if embeddings.len() != texts.len() {
            bail!(
                "Gemini returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            );
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": "RETRIEVAL_QUERY",
        });

        let json = post_with_retry(
            &self.config,
            &self.endpoint("embedContent"),
            &[],
            &body,
            "Gemini",
        )
        .await?;
        let values = json
            .get("embedding")
            .and_then(|e| e.get("values"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embedding.values"))?;
        check_dims(json_to_vec(values))
    }
}

fn parse_gemini_batch_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for item in embeddings {
        let values = item
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
        result.push(check_dims(json_to_vec(values))?);
    }
    Ok(result)
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. OpenAI has no
/// task-type distinction, so documents and queries share one path.
pub struct OpenAiProvider {
    model: String,
    api_key: String,
    config: EmbeddingConfig,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": EMBEDDING_DIMS,
        });
        let auth = format!("Bearer {}", self.api_key);
        let headers = [("Authorization", auth.as_str())];

        let json = post_with_retry(
            &self.config,
            "https://api.openai.com/v1/embeddings",
            &headers,
            &body,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_documents(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        embeddings.push(check_dims(json_to_vec(embedding))?);
    }
    Ok(embeddings)
}

// ============ Shared HTTP plumbing ============

/// POST a JSON body with retry/backoff.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
async fn post_with_retry(
    config: &EmbeddingConfig,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    provider_label: &str,
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        provider_label,
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", provider_label, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

fn json_to_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect()
}

/// Reject vectors that don't match the fixed dimension the schema and
/// query validation assume.
fn check_dims(vec: Vec<f32>) -> Result<Vec<f32>> {
    if vec.len() != EMBEDDING_DIMS {
        bail!(
            "Provider returned a {}-dimension embedding, expected {}",
            vec.len(),
            EMBEDDING_DIMS
        );
    }
    Ok(vec)
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_gemini_batch_parse() {
        let dims_values: Vec<f64> = (0..EMBEDDING_DIMS).map(|i| i as f64 * 0.001).collect();
        let json = serde_json::json!({
            "embeddings": [{ "values": dims_values }]
        });
        let parsed = parse_gemini_batch_response(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].len(), EMBEDDING_DIMS);
        assert!((parsed[0][1] - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_dims_rejected() {
        let json = serde_json::json!({
            "embeddings": [{ "values": [0.1, 0.2, 0.3] }]
        });
        let err = parse_gemini_batch_response(&json).unwrap_err().to_string();
        assert!(err.contains("expected 768"), "unexpected error: {err}");
    }

    #[test]
    fn test_openai_parse() {
        let dims_values: Vec<f64> = vec![0.5; EMBEDDING_DIMS];
        let json = serde_json::json!({
            "data": [{ "embedding": dims_values }]
        });
        let parsed = parse_openai_response(&json).unwrap();
        assert_eq!(parsed[0].len(), EMBEDDING_DIMS);
    }

    #[test]
    fn test_malformed_response_rejected() {
        let json = serde_json::json!({ "unexpected": true });
        assert!(parse_gemini_batch_response(&json).is_err());
        assert!(parse_openai_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let provider = DisabledProvider;
        assert!(provider.embed_query("anything").await.is_err());
        assert!(provider
            .embed_documents(&["text".to_string()])
            .await
            .is_err());
    }
}
