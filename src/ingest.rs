//! Knowledge base build pipeline.
//!
//! Coordinates the full build: documents → chunking → batched embedding →
//! index upsert. A build is always a full replace of the collection.
//!
//! Failures are contained per chunk and per batch:
//! - a failed embedding batch is retried one chunk at a time, so only the
//!   chunks that really fail are marked failed;
//! - failed chunks are stored as placeholders or left out, per
//!   [`FailurePolicy`];
//! - a batch whose upsert fails is counted in
//!   [`IndexBuildReport::index_batches_failed`] and the build moves on.

use anyhow::Result;

use crate::chunk::chunk_document;
use crate::config::{Config, FailurePolicy};
use crate::embedding::{EmbeddingIntent, EmbeddingProvider};
use crate::engine::{BuildOutcome, RagEngine};
use crate::index::VectorIndex;
use crate::models::{Chunk, ChunkMetadata, Document, IndexBuildReport, IndexEntry};
use crate::sources::{self, SourceSelector};

/// Tunables for [`build_index`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub on_failure: FailurePolicy,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            batch_size: config.embedding.batch_size,
            on_failure: config.embedding.on_failure,
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Rebuild `index` from `documents`.
///
/// Returns `Err` only if the index cannot be cleared; every later failure is
/// recorded in the report.
pub async fn build_index(
    documents: &[Document],
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    options: &BuildOptions,
) -> Result<IndexBuildReport> {
    let mut report = IndexBuildReport {
        collection: index.collection().to_string(),
        ..IndexBuildReport::default()
    };

    index.clear().await?;

    let mut work: Vec<(Chunk, ChunkMetadata)> = Vec::new();
    for doc in documents {
        for chunk in chunk_document(doc, options.chunk_size, options.overlap) {
            let metadata = ChunkMetadata {
                document_id: doc.id.clone(),
                sequence: chunk.sequence,
                title: doc.title.clone(),
                source_url: doc.source_url.clone(),
                section_label: chunk.section_label.clone(),
            };
            work.push((chunk, metadata));
        }
        report.documents_processed += 1;
    }
    report.chunks_created = work.len();

    tracing::info!(
        collection = %report.collection,
        documents = report.documents_processed,
        chunks = report.chunks_created,
        model = embedder.model_name(),
        "building index"
    );

    for (batch_no, batch) in work.chunks(options.batch_size.max(1)).enumerate() {
        let vectors = embed_batch(embedder, batch).await;

        let mut entries = Vec::with_capacity(batch.len());
        for ((chunk, metadata), vector) in batch.iter().zip(vectors) {
            let (vector, placeholder) = match vector {
                Some(v) => {
                    report.embeddings_succeeded += 1;
                    (v, false)
                }
                None => {
                    report.embeddings_failed += 1;
                    report.failed_chunk_ids.push(chunk.id.clone());
                    if options.on_failure == FailurePolicy::Exclude {
                        report.chunks_excluded += 1;
                        continue;
                    }
                    (vec![0.0; embedder.dims()], true)
                }
            };
            entries.push(IndexEntry {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                vector,
                metadata: metadata.clone(),
                placeholder,
            });
        }

        if entries.is_empty() {
            continue;
        }
        match index.upsert(&entries).await {
            Ok(()) => report.chunks_indexed += entries.len(),
            Err(e) => {
                tracing::warn!(batch = batch_no, error = %e, "index upsert failed");
                report.index_batches_failed += 1;
            }
        }
    }

    if report.is_degraded() {
        tracing::warn!(
            embeddings_failed = report.embeddings_failed,
            index_batches_failed = report.index_batches_failed,
            "index built with failures"
        );
    } else {
        tracing::info!(chunks_indexed = report.chunks_indexed, "index built");
    }

    Ok(report)
}

/// One vector per chunk, `None` where embedding failed.
async fn embed_batch(
    embedder: &dyn EmbeddingProvider,
    batch: &[(Chunk, ChunkMetadata)],
) -> Vec<Option<Vec<f32>>> {
    let texts: Vec<String> = batch.iter().map(|(c, _)| c.text.clone()).collect();
    let dims = embedder.dims();

    match embedder.embed(&texts, EmbeddingIntent::Document).await {
        Ok(vectors) if vectors.len() == texts.len() => {
            return vectors
                .into_iter()
                .map(|v| if v.len() == dims { Some(v) } else { None })
                .collect();
        }
        Ok(vectors) => tracing::warn!(
            expected = texts.len(),
            got = vectors.len(),
            "embedding batch returned the wrong number of vectors; retrying per chunk"
        ),
        Err(e) => tracing::warn!(
            size = texts.len(),
            error = %e,
            "embedding batch failed; retrying per chunk"
        ),
    }

    let mut out = Vec::with_capacity(texts.len());
    for (text, (chunk, _)) in texts.iter().zip(batch) {
        let vector = match embedder
            .embed(std::slice::from_ref(text), EmbeddingIntent::Document)
            .await
        {
            Ok(mut vectors) if vectors.len() == 1 && vectors[0].len() == dims => vectors.pop(),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(chunk = %chunk.id, error = %e, "chunk embedding failed");
                None
            }
        };
        out.push(vector);
    }
    out
}

/// Run the `gw build` command.
pub async fn run_build(
    config: &Config,
    selector: &SourceSelector,
    if_empty: bool,
    dry_run: bool,
) -> Result<()> {
    let documents = sources::load_documents(config, selector)?;

    if dry_run {
        let chunks: usize = documents
            .iter()
            .map(|d| chunk_document(d, config.chunking.chunk_size, config.chunking.overlap).len())
            .sum();
        println!("build {} (dry-run)", config.db.collection);
        println!("  documents found: {}", documents.len());
        println!("  estimated chunks: {}", chunks);
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        eprintln!(
            "Warning: embedding provider is disabled; every chunk will be stored as a placeholder that never matches a query"
        );
    }

    let engine = RagEngine::from_config(config).await?;
    let outcome = if if_empty {
        engine.ensure_built(&documents).await?
    } else {
        BuildOutcome::Built(engine.build(&documents).await?)
    };

    match outcome {
        BuildOutcome::Existing { entries } => {
            println!("build {}", config.db.collection);
            println!("  index already populated: {} entries", entries);
            println!("  skipped (--if-empty)");
        }
        BuildOutcome::Built(report) => {
            println!("build {}", report.collection);
            println!("  documents: {}", report.documents_processed);
            println!("  chunks created: {}", report.chunks_created);
            println!("  embeddings succeeded: {}", report.embeddings_succeeded);
            println!("  embeddings failed: {}", report.embeddings_failed);
            println!("  chunks indexed: {}", report.chunks_indexed);
            if report.chunks_excluded > 0 {
                println!("  chunks excluded: {}", report.chunks_excluded);
            }
            if report.index_batches_failed > 0 {
                println!("  index batches failed: {}", report.index_batches_failed);
            }
            if report.is_degraded() {
                eprintln!(
                    "Warning: index is degraded; {} chunk(s) failed to embed and {} batch(es) failed to store",
                    report.embeddings_failed, report.index_batches_failed
                );
                for id in report.failed_chunk_ids.iter().take(10) {
                    eprintln!("  failed chunk: {}", id);
                }
            }
        }
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::index::MemoryIndex;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn doc(id: &str, body: &str) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_uppercase(),
            body: body.to_string(),
            source_url: Some(format!("https://example.edu/{}", id)),
            retrieved_at: Utc::now(),
            section: None,
        }
    }

    /// Fails any batch containing a text with `poison` in it and records
    /// the intent of every call.
    struct PoisonEmbedder {
        inner: HashProvider,
        poison: &'static str,
        calls: AtomicUsize,
        intents: Mutex<Vec<EmbeddingIntent>>,
    }

    impl PoisonEmbedder {
        fn new(poison: &'static str) -> Self {
            Self {
                inner: HashProvider::new(16),
                poison,
                calls: AtomicUsize::new(0),
                intents: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for PoisonEmbedder {
        fn model_name(&self) -> &str {
            "poison"
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed(
            &self,
            texts: &[String],
            intent: EmbeddingIntent,
        ) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.intents.lock().unwrap().push(intent);
            if texts.iter().any(|t| t.contains(self.poison)) {
                anyhow::bail!("rejected");
            }
            self.inner.embed(texts, intent).await
        }
    }

    #[tokio::test]
    async fn test_build_counts_and_metadata() {
        let index = MemoryIndex::new("kb");
        let docs = vec![doc("fees", "Tuition is 1,20,000."), doc("hours", "Open 9 to 5.")];
        let report = build_index(&docs, &index, &HashProvider::new(32), &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(report.documents_processed, 2);
        assert_eq!(report.chunks_created, 2);
        assert_eq!(report.chunks_indexed, 2);
        assert!(!report.is_degraded());
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index
            .query(&HashProvider::new(32).embed_one("tuition"), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "fees_0");
        assert_eq!(hits[0].metadata.title, "FEES");
        assert_eq!(
            hits[0].metadata.source_url.as_deref(),
            Some("https://example.edu/fees")
        );
    }

    #[tokio::test]
    async fn test_failed_batch_retried_per_chunk() {
        let embedder = PoisonEmbedder::new("POISON");
        let docs = vec![doc("a", "fine"), doc("b", "POISON here"), doc("c", "also fine")];
        let options = BuildOptions {
            batch_size: 3,
            ..BuildOptions::default()
        };
        let index = MemoryIndex::new("kb");
        let report = build_index(&docs, &index, &embedder, &options).await.unwrap();

        // One failed batch call, then three single-chunk calls.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.embeddings_succeeded, 2);
        assert_eq!(report.embeddings_failed, 1);
        assert_eq!(report.failed_chunk_ids, vec!["b_0".to_string()]);
        assert_eq!(report.chunks_indexed, 3);
        assert!(report.is_degraded());
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_build_embeds_with_document_intent() {
        let embedder = PoisonEmbedder::new("POISON");
        let docs = vec![doc("a", "fine"), doc("b", "POISON"), doc("c", "also fine")];
        let options = BuildOptions {
            batch_size: 2,
            ..BuildOptions::default()
        };
        build_index(&docs, &MemoryIndex::new("kb"), &embedder, &options)
            .await
            .unwrap();

        // Batch calls and per-chunk retries alike.
        let intents = embedder.intents.lock().unwrap();
        assert!(intents.len() > 2);
        assert!(intents.iter().all(|i| *i == EmbeddingIntent::Document));
    }

    #[tokio::test]
    async fn test_exclude_policy_leaves_failures_out() {
        let embedder = PoisonEmbedder::new("POISON");
        let docs = vec![doc("a", "fine"), doc("b", "POISON")];
        let options = BuildOptions {
            on_failure: FailurePolicy::Exclude,
            ..BuildOptions::default()
        };
        let index = MemoryIndex::new("kb");
        let report = build_index(&docs, &index, &embedder, &options).await.unwrap();
        assert_eq!(report.chunks_excluded, 1);
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_contents() {
        let index = MemoryIndex::new("kb");
        let embedder = HashProvider::new(16);
        let options = BuildOptions::default();
        build_index(&[doc("old", "stale text")], &index, &embedder, &options)
            .await
            .unwrap();
        build_index(&[doc("new", "fresh text")], &index, &embedder, &options)
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.query(&embedder.embed_one("text"), 5).await.unwrap();
        assert_eq!(hits[0].id, "new_0");
    }

    #[tokio::test]
    async fn test_empty_document_list_clears_index() {
        let index = MemoryIndex::new("kb");
        let embedder = HashProvider::new(16);
        build_index(&[doc("a", "x y z")], &index, &embedder, &BuildOptions::default())
            .await
            .unwrap();
        let report = build_index(&[], &index, &embedder, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(report.chunks_created, 0);
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
