//! Query-time retrieval: embed the question, search the index, score hits.

use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::models::RetrievedChunk;

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    min_similarity: Option<f32>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        min_similarity: Option<f32>,
    ) -> Self {
        Self {
            embedder,
            index,
            min_similarity,
        }
    }

    /// Up to `k` chunks most similar to `query`, best first.
    ///
    /// A blank query or an empty index yields no chunks without calling the
    /// embedder. Similarity is `1 - cosine distance`.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if self.index.count().await.map_err(RagError::from_anyhow)? == 0 {
            return Ok(Vec::new());
        }

        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("{:#}", e)))?;

        if let Some(expected) = self.index.dims().await.map_err(RagError::from_anyhow)? {
            if expected != vector.len() {
                return Err(RagError::EmbeddingUnavailable(format!(
                    "query embedding has {} dimensions but the index holds {}-d vectors; \
                     rebuild the index after changing embedding models",
                    vector.len(),
                    expected
                )));
            }
        }

        let hits = self
            .index
            .query(&vector, k)
            .await
            .map_err(RagError::from_anyhow)?;

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                id: hit.id,
                text: hit.text,
                metadata: hit.metadata,
                similarity_score: 1.0 - hit.distance,
            })
            .filter(|c| match self.min_similarity {
                Some(min) => c.similarity_score >= min,
                None => true,
            })
            .collect();

        tracing::debug!(
            query_len = query.len(),
            k,
            returned = chunks.len(),
            "retrieved chunks"
        );
        Ok(chunks)
    }
}
