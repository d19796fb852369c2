//! The assembled pipeline: index + embedder + generator + settings.
//!
//! A [`RagEngine`] owns everything a query or build needs and nothing
//! global, so several engines (different collections, different providers)
//! can live in one process. It is `Send + Sync`; the HTTP server shares one
//! behind an `Arc`.

use anyhow::Result;
use std::sync::Arc;

use crate::answer::AnswerComposer;
use crate::config::{self, Config};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::RagError;
use crate::generation::{create_generator, GenerationParams, GenerationProvider};
use crate::index::{SqliteIndex, VectorIndex};
use crate::ingest::{build_index, BuildOptions};
use crate::models::{Answer, AnswerStatus, Document, IndexBuildReport, IndexStats, RetrievedChunk};
use crate::retrieve::Retriever;

/// Result of [`RagEngine::ensure_built`].
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// The index was empty and has been built.
    Built(IndexBuildReport),
    /// The index already held entries; nothing was done.
    Existing { entries: usize },
}

pub struct RagEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    retriever: Retriever,
    composer: AnswerComposer,
    options: BuildOptions,
    top_k: usize,
}

impl RagEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        config: &Config,
    ) -> Self {
        let retriever = Retriever::new(
            embedder.clone(),
            index.clone(),
            config.retrieval.min_similarity,
        );
        let composer = AnswerComposer::new(
            generator.clone(),
            config.answer.clone(),
            GenerationParams::from(&config.generation),
        );
        Self {
            index,
            embedder,
            generator,
            retriever,
            composer,
            options: BuildOptions::from_config(config),
            top_k: config.retrieval.top_k,
        }
    }

    /// Validate `config`, construct its providers, and open its SQLite
    /// collection. Provider problems (unknown provider, missing API key)
    /// surface as [`RagError::Configuration`] before the database is touched.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config::validate(config)?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let index = SqliteIndex::connect(&config.db).await?;
        Ok(Self::new(Arc::new(index), embedder, generator, config))
    }

    /// Full rebuild of the collection from `documents`.
    pub async fn build(&self, documents: &[Document]) -> Result<IndexBuildReport> {
        build_index(
            documents,
            self.index.as_ref(),
            self.embedder.as_ref(),
            &self.options,
        )
        .await
    }

    /// Build only if the collection is empty.
    pub async fn ensure_built(&self, documents: &[Document]) -> Result<BuildOutcome> {
        let entries = self.index.count().await?;
        if entries > 0 {
            tracing::info!(
                collection = self.index.collection(),
                entries,
                "using existing index"
            );
            return Ok(BuildOutcome::Existing { entries });
        }
        Ok(BuildOutcome::Built(self.build(documents).await?))
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        self.retriever.retrieve(query, k).await
    }

    /// Answer `question` from the top `retrieval.top_k` chunks. Never fails:
    /// retrieval problems become fallback answers with a matching status.
    pub async fn ask(&self, question: &str) -> Answer {
        match self.retriever.retrieve(question, self.top_k).await {
            Ok(chunks) => self.composer.answer(question, &chunks).await,
            Err(e) => {
                let status = match e {
                    RagError::EmbeddingUnavailable(_) => AnswerStatus::EmbeddingUnavailable,
                    _ => AnswerStatus::RetrievalFailed,
                };
                tracing::warn!(error = %e, ?status, "retrieval failed; returning fallback");
                self.composer.unavailable(status, 0)
            }
        }
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            collection: self.index.collection().to_string(),
            entries: self.index.count().await?,
            dims: self.index.dims().await?,
            embedding_model: self.embedder.model_name().to_string(),
            generation_model: self.generator.model_name().to_string(),
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::generation::DisabledGenerator;
    use crate::index::MemoryIndex;
    use chrono::Utc;

    fn doc(id: &str, title: &str, body: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            source_url: None,
            retrieved_at: Utc::now(),
            section: None,
        }
    }

    fn engine() -> RagEngine {
        RagEngine::new(
            Arc::new(MemoryIndex::new("kb")),
            Arc::new(HashProvider::new(64)),
            Arc::new(DisabledGenerator),
            &Config::default(),
        )
    }

    #[tokio::test]
    async fn test_ensure_built_only_once() {
        let engine = engine();
        let docs = vec![doc("a", "Library", "Open until midnight.")];
        match engine.ensure_built(&docs).await.unwrap() {
            BuildOutcome::Built(report) => assert_eq!(report.chunks_indexed, 1),
            other => panic!("expected a build, got {:?}", other),
        }
        match engine.ensure_built(&docs).await.unwrap() {
            BuildOutcome::Existing { entries } => assert_eq!(entries, 1),
            other => panic!("expected existing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ask_on_empty_index_is_no_context() {
        let answer = engine().ask("What are the fees?").await;
        assert_eq!(answer.status, AnswerStatus::NoContext);
        assert_eq!(answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_ask_with_disabled_generator_falls_back() {
        let engine = engine();
        engine
            .build(&[doc("a", "Fees", "Tuition fees are 1,20,000 per year.")])
            .await
            .unwrap();
        let answer = engine.ask("tuition fees").await;
        assert_eq!(answer.status, AnswerStatus::GenerationUnavailable);
        assert_eq!(answer.retrieved_chunk_count, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let engine = engine();
        engine
            .build(&[doc("a", "Fees", "Tuition."), doc("b", "Hours", "Nine to five.")])
            .await
            .unwrap();
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.collection, "kb");
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.dims, Some(64));
        assert_eq!(stats.embedding_model, "feature-hash");
        assert_eq!(stats.generation_model, "disabled");
    }

    #[tokio::test]
    async fn test_from_config_rejects_missing_key() {
        let mut config = Config::default();
        config.embedding.provider = "gemini".to_string();
        config.embedding.api_key_env = "GROUNDWORK_TEST_ENGINE_MISSING_KEY".to_string();
        let err = RagEngine::from_config(&config).await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::Configuration(_))
        ));
    }
}
