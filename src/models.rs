//! Core data models used throughout groundwork.
//!
//! These types represent the documents, chunks, index entries, and answers
//! that flow through the build and query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw unit of knowledge, produced by a source loader.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: String,
    pub source_url: Option<String>,
    pub retrieved_at: DateTime<Utc>,
    /// Label of the section the document came from, if its source has sections.
    pub section: Option<String>,
}

/// A retrievable slice of a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `{document_id}_{sequence}`.
    pub id: String,
    pub document_id: String,
    pub sequence: usize,
    pub text: String,
    pub section_label: Option<String>,
}

/// Metadata stored alongside every index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub sequence: usize,
    pub title: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub section_label: Option<String>,
}

/// One row of the vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
    /// Set when the chunk's embedding failed and `vector` is a zero stand-in.
    pub placeholder: bool,
}

/// A nearest-neighbour hit; `distance` is cosine distance in `[0, 2]`.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// A chunk returned by the retriever, ranked by similarity.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub similarity_score: f32,
}

/// A source cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub source_url: Option<String>,
    pub similarity: f32,
}

/// How an [`Answer`] came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Generated from retrieved context.
    Answered,
    /// Nothing relevant was retrieved; fixed fallback text.
    NoContext,
    /// The query could not be embedded; fallback text.
    EmbeddingUnavailable,
    /// The index could not be searched; fallback text.
    RetrievalFailed,
    /// The generator failed or returned nothing; fallback text.
    GenerationUnavailable,
}

/// The caller-facing result of a question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
    pub retrieved_chunk_count: usize,
    pub status: AnswerStatus,
}

/// Outcome of a full index build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexBuildReport {
    pub collection: String,
    pub documents_processed: usize,
    pub chunks_created: usize,
    pub embeddings_succeeded: usize,
    pub embeddings_failed: usize,
    pub chunks_indexed: usize,
    pub chunks_excluded: usize,
    pub index_batches_failed: usize,
    pub failed_chunk_ids: Vec<String>,
}

impl IndexBuildReport {
    /// True when some chunks failed to embed or to land in the index.
    pub fn is_degraded(&self) -> bool {
        self.embeddings_failed > 0 || self.index_batches_failed > 0
    }
}

/// Summary of what a collection currently holds.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub collection: String,
    pub entries: usize,
    pub dims: Option<usize>,
    pub embedding_model: String,
    pub generation_model: String,
}
