//! TOML configuration.
//!
//! Every section has defaults, so a config file only needs the settings
//! that differ. [`load_config`] parses and validates; validation failures
//! are [`RagError::Configuration`](crate::error::RagError::Configuration).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::embedding::EmbeddingIntent;
use crate::error::config_bail;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub answer: AnswerConfig,
    pub server: ServerConfig,
    pub sources: SourcesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Named collection inside the database; a build owns its contents.
    pub collection: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/groundwork.sqlite"),
            collection: "knowledge_base".to_string(),
        }
    }
}

/// Chunk sizes are measured in characters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Results below this similarity are dropped. Unset keeps everything.
    pub min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: None,
        }
    }
}

/// What the loader does with chunks whose embedding failed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Store the chunk with a zero vector flagged as a placeholder. It counts
    /// toward the index size but is never returned by a query.
    #[default]
    Placeholder,
    /// Leave the chunk out of the index entirely.
    Exclude,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub url: Option<String>,
    /// Environment variable holding the API key for hosted providers.
    pub api_key_env: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub document_intent: Option<String>,
    pub query_intent: Option<String>,
    pub on_failure: FailurePolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: None,
            dims: None,
            url: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            batch_size: 10,
            max_retries: 2,
            timeout_secs: 30,
            retry_backoff_ms: 1000,
            document_intent: None,
            query_intent: None,
            on_failure: FailurePolicy::Placeholder,
        }
    }
}

impl EmbeddingConfig {
    /// False when the provider is `"disabled"`; builds then only store placeholders.
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The label sent to the provider for an intent: the configured value,
    /// else the provider's conventional one.
    pub fn intent_label(&self, intent: EmbeddingIntent) -> String {
        let configured = match intent {
            EmbeddingIntent::Document => self.document_intent.as_deref(),
            EmbeddingIntent::Query => self.query_intent.as_deref(),
        };
        if let Some(label) = configured {
            return label.to_string();
        }
        let label = match (self.provider.as_str(), intent) {
            ("gemini", EmbeddingIntent::Document) => "RETRIEVAL_DOCUMENT",
            ("gemini", EmbeddingIntent::Query) => "RETRIEVAL_QUERY",
            ("ollama", EmbeddingIntent::Document) => "search_document",
            ("ollama", EmbeddingIntent::Query) => "search_query",
            (_, EmbeddingIntent::Document) => "passage",
            (_, EmbeddingIntent::Query) => "query",
        };
        label.to_string()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: Option<String>,
    pub url: Option<String>,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub retry_backoff_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            top_p: 0.9,
            max_retries: 2,
            timeout_secs: 30,
            retry_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnswerConfig {
    pub assistant_name: String,
    pub organization: Option<String>,
    /// Who to contact when the knowledge base cannot answer, e.g.
    /// `"the admissions office at +1-555-0100"`.
    pub fallback_contact: String,
    pub max_sources: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Knowledge Base Assistant".to_string(),
            organization: None,
            fallback_contact: "the support team".to_string(),
            max_sources: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7340".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesConfig {
    /// JSON file of `{url, title, content, ...}` records.
    pub json: Option<PathBuf>,
    pub directory: Option<DirectorySourceConfig>,
    pub catalog: Vec<CatalogSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectorySourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

/// A titled section written inline in the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogSection {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily rolling log files. Unset logs to stderr only.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.db.collection.trim().is_empty() {
        config_bail!("db.collection must not be empty");
    }

    if config.chunking.chunk_size == 0 {
        config_bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        config_bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k < 1 {
        config_bail!("retrieval.top_k must be >= 1");
    }
    if let Some(min) = config.retrieval.min_similarity {
        if !(-1.0..=1.0).contains(&min) {
            config_bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
        }
    }

    let emb = &config.embedding;
    match emb.provider.as_str() {
        "disabled" | "hash" | "gemini" | "ollama" | "local" => {}
        other => config_bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, gemini, ollama, or local.",
            other
        ),
    }
    if emb.batch_size == 0 {
        config_bail!("embedding.batch_size must be > 0");
    }
    if emb.timeout_secs == 0 {
        config_bail!("embedding.timeout_secs must be > 0");
    }
    if emb.dims == Some(0) {
        config_bail!("embedding.dims must be > 0 when set");
    }
    if emb.provider == "ollama" && (emb.model.is_none() || emb.dims.is_none()) {
        config_bail!("embedding.model and embedding.dims must be specified for provider 'ollama'");
    }

    let gen = &config.generation;
    match gen.provider.as_str() {
        "disabled" | "gemini" | "ollama" => {}
        other => config_bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, or ollama.",
            other
        ),
    }
    if gen.provider == "ollama" && gen.model.is_none() {
        config_bail!("generation.model must be specified for provider 'ollama'");
    }
    if gen.max_tokens == 0 {
        config_bail!("generation.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&gen.temperature) {
        config_bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if !(gen.top_p > 0.0 && gen.top_p <= 1.0) {
        config_bail!("generation.top_p must be in (0.0, 1.0]");
    }
    if gen.timeout_secs == 0 {
        config_bail!("generation.timeout_secs must be > 0");
    }

    if config.answer.max_sources == 0 {
        config_bail!("answer.max_sources must be >= 1");
    }

    Ok(())
}
