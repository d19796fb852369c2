//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`HashProvider`]**: offline feature-hashing bag of words; deterministic, no model download.
//! - **[`GeminiProvider`]**: calls the Gemini `batchEmbedContents` API with a task type per intent.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: runs models on-device via fastembed (feature `local-embeddings`).
//!
//! Every provider embeds with an [`EmbeddingIntent`]: documents are indexed
//! with the document intent and questions are embedded with the query
//! intent. Both land in the same vector space with the same dimensionality.
//!
//! Also provides vector utilities for the SQLite index:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::config_bail;
use crate::http::{self, RetryPolicy};

/// Why a text is being embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingIntent {
    /// A chunk being written to the index.
    Document,
    /// A question being matched against the index.
    Query,
}

/// Trait for embedding providers.
///
/// `embed` returns one vector per input text, in input order, each of
/// length [`dims`](EmbeddingProvider::dims). Transient failures are retried
/// inside the provider; an `Err` means retries are exhausted.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
///
/// Convenience wrapper around [`EmbeddingProvider::embed`] with the query
/// intent (e.g. embedding a question for retrieval).
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider
        .embed(&[text.to_string()], EmbeddingIntent::Query)
        .await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

fn check_batch_len(provider: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        bail!(
            "{} returned {} embeddings for {} inputs",
            provider,
            got,
            expected
        );
    }
    Ok(())
}

fn api_key_from_env(var: &str, provider: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => config_bail!(
            "{} environment variable not set (required by the {} provider)",
            var,
            provider
        ),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String], _intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Hash Provider ============

/// Deterministic bag-of-words embedder using the hashing trick.
///
/// Each lowercase alphanumeric token of two or more characters is hashed
/// with SHA-256 into one of `dims` buckets with a ±1 sign; the result is
/// L2-normalized. Texts sharing vocabulary score high cosine similarity.
///
/// The intent is ignored: document and query vectors for the same text are
/// identical, and the configured `passage`/`query` labels go unused.
pub struct HashProvider {
    dims: usize,
}

impl HashProvider {
    pub const DEFAULT_DIMS: usize = 256;

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let h = u64::from_le_bytes(bytes);
            let bucket = (h % self.dims as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            vec[bucket] += sign;
        }
        l2_normalize(&mut vec);
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "feature-hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], _intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini API.
///
/// Calls `POST /v1beta/models/{model}:batchEmbedContents`, sending the
/// intent label as each request's `taskType` (`RETRIEVAL_DOCUMENT` /
/// `RETRIEVAL_QUERY` by default). Reads the API key from the environment
/// variable named by `embedding.api_key_env`.
pub struct GeminiProvider {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    document_label: String,
    query_label: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub const DEFAULT_MODEL: &'static str = "text-embedding-004";
    pub const DEFAULT_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env, "gemini")?;
        let policy = RetryPolicy::new(
            config.max_retries,
            config.timeout_secs,
            config.retry_backoff_ms,
        );
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            dims: config.dims.unwrap_or(768),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_URL.to_string()),
            api_key,
            document_label: config.intent_label(EmbeddingIntent::Document),
            query_label: config.intent_label(EmbeddingIntent::Query),
            client: policy.client()?,
            policy,
        })
    }

    /// `batchEmbedContents` body: one request per text, tagged with the
    /// intent's task type.
    fn request_body(&self, texts: &[String], intent: EmbeddingIntent) -> serde_json::Value {
        let task_type = match intent {
            EmbeddingIntent::Document => &self.document_label,
            EmbeddingIntent::Query => &self.query_label,
        };
        let model_path = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": t }] },
                    "taskType": task_type,
                    "outputDimensionality": self.dims,
                })
            })
            .collect();
        serde_json::json!({ "requests": requests })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        let body = self.request_body(texts, intent);
        let url = format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let json = http::post_json(
            &self.client,
            &self.policy,
            "Gemini embeddings",
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            &body,
        )
        .await?;
        let vectors = parse_gemini_response(&json)?;
        check_batch_len("Gemini", texts.len(), vectors.len())?;
        Ok(vectors)
    }
}

/// Extracts `embeddings[].values` in order.
fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|item| {
            let values = item
                .get("values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
            values_to_vec(values)
        })
        .collect()
}

fn values_to_vec(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("Invalid embedding value: {}", v))
        })
        .collect()
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// The intent label is prepended to each text (`search_document: ...` /
/// `search_query: ...` by default), the convention of nomic-style models.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    document_label: String,
    query_label: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = match &config.model {
            Some(m) => m.clone(),
            None => config_bail!("embedding.model required for Ollama provider"),
        };
        let dims = match config.dims {
            Some(d) => d,
            None => config_bail!("embedding.dims required for Ollama provider"),
        };
        let policy = RetryPolicy::new(
            config.max_retries,
            config.timeout_secs,
            config.retry_backoff_ms,
        );
        Ok(Self {
            model,
            dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            document_label: config.intent_label(EmbeddingIntent::Document),
            query_label: config.intent_label(EmbeddingIntent::Query),
            client: policy.client()?,
            policy,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        let label = match intent {
            EmbeddingIntent::Document => &self.document_label,
            EmbeddingIntent::Query => &self.query_label,
        };
        let input: Vec<String> = texts
            .iter()
            .map(|t| prefix_with_label(label, t))
            .collect();
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });
        let url = format!("{}/api/embed", self.url.trim_end_matches('/'));

        let json = http::post_json(&self.client, &self.policy, "Ollama embeddings", &url, &[], &body)
            .await
            .map_err(|e| anyhow::anyhow!("{} (is Ollama running at {}?)", e, self.url))?;
        let vectors = parse_ollama_response(&json)?;
        check_batch_len("Ollama", texts.len(), vectors.len())?;
        Ok(vectors)
    }
}

fn prefix_with_label(label: &str, text: &str) -> String {
    if label.is_empty() {
        text.to_string()
    } else {
        format!("{}: {}", label, text)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding.as_array().ok_or_else(|| {
                anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
            })?;
            values_to_vec(values)
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// On-device embedding provider backed by fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached; after
/// that no network calls are made. The intent label is used as a text
/// prefix (`passage: ` / `query: `), the convention of E5-style models.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    document_label: String,
    query_label: String,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "multilingual-e5-small".to_string());
        let (fastembed_model, default_dims) = local_model(&model_name)?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims: config.dims.unwrap_or(default_dims),
            document_label: config.intent_label(EmbeddingIntent::Document),
            query_label: config.intent_label(EmbeddingIntent::Query),
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn local_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
        other => config_bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        let label = match intent {
            EmbeddingIntent::Document => &self.document_label,
            EmbeddingIntent::Query => &self.query_label,
        };
        let input: Vec<String> = texts.iter().map(|t| prefix_with_label(label, t)).collect();
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(input, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"hash"` | [`HashProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings`) |
///
/// # Errors
///
/// [`RagError::Configuration`](crate::error::RagError::Configuration) for unknown providers, missing settings, or
/// a missing API key.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "hash" => Ok(Arc::new(HashProvider::new(
            config.dims.unwrap_or(HashProvider::DEFAULT_DIMS),
        ))),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => config_bail!(
            "Local embedding provider requires building with --features local-embeddings"
        ),
        other => config_bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use groundwork::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Scale `vec` to unit length in place; zero vectors are left untouched.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or a zero vector.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
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

    (dot / denom).clamp(-1.0, 1.0)
}

/// Cosine distance, `1 - cosine_similarity`, in `[0.0, 2.0]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
