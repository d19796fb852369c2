//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the persistent home of chunk embeddings:
//! a named collection of [`IndexEntry`] rows searched by cosine distance.
//! Two backends:
//!
//! - [`SqliteIndex`]: durable, shares the SQLite file with nothing else.
//! - [`MemoryIndex`]: `RwLock`-guarded map for tests and ephemeral use.
//!
//! # Invariants
//!
//! - Every non-placeholder vector in a collection has the same length; the
//!   first vector written fixes it, and [`clear`](VectorIndex::clear)
//!   forgets it. Mismatches fail with
//!   [`RagError::DimensionMismatch`](crate::error::RagError::DimensionMismatch).
//! - `upsert` is all-or-nothing for the batch it is given.
//! - Placeholder entries count toward [`count`](VectorIndex::count) but are
//!   never returned by [`query`](VectorIndex::query).
//! - `query` returns hits in ascending cosine distance (ties by id), at most
//!   `k` of them, `k` clamped to at least 1.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RagError;
use crate::models::{IndexEntry, IndexHit};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Name of the collection this handle reads and writes.
    fn collection(&self) -> &str;

    /// Remove every entry and forget the recorded dimensionality.
    async fn clear(&self) -> Result<()>;

    /// Insert or replace entries by id, atomically.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Delete entries by id; returns how many existed.
    async fn delete(&self, ids: &[String]) -> Result<u64>;

    /// Nearest non-placeholder entries to `vector`.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Number of entries, placeholders included.
    async fn count(&self) -> Result<usize>;

    /// Dimensionality recorded for the collection, if any vector was written.
    async fn dims(&self) -> Result<Option<usize>>;
}

/// Dimensionality a batch would record, checked against `current`.
///
/// Placeholder entries are ignored: their vectors are stand-ins.
pub(crate) fn check_batch_dims(
    current: Option<usize>,
    entries: &[IndexEntry],
) -> Result<Option<usize>, RagError> {
    let mut dims = current;
    for entry in entries.iter().filter(|e| !e.placeholder) {
        match dims {
            Some(expected) if expected != entry.vector.len() => {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: entry.vector.len(),
                });
            }
            Some(_) => {}
            None => dims = Some(entry.vector.len()),
        }
    }
    Ok(dims)
}

pub(crate) fn check_query_dims(current: Option<usize>, vector: &[f32]) -> Result<(), RagError> {
    match current {
        Some(expected) if expected != vector.len() => Err(RagError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}

/// Order hits by ascending distance, ties by id, and keep the first `k`.
pub(crate) fn take_nearest(mut hits: Vec<IndexHit>, k: usize) -> Vec<IndexHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k.max(1));
    hits
}


#[cfg(test)]
mod tests {
    use super::conformance::{entry, placeholder};
    use super::*;

    #[test]
    fn test_check_batch_dims_ignores_placeholders() {
        let batch = vec![placeholder("p_0", 7), entry("a_0", vec![1.0, 2.0])];
        assert_eq!(check_batch_dims(None, &batch).unwrap(), Some(2));
        assert_eq!(check_batch_dims(None, &[placeholder("p_0", 7)]).unwrap(), None);
    }

    #[test]
    fn test_check_batch_dims_mixed_lengths() {
        let batch = vec![entry("a_0", vec![1.0]), entry("b_0", vec![1.0, 2.0])];
        assert!(check_batch_dims(None, &batch).is_err());
    }

    #[test]
    fn test_take_nearest_ties_by_id() {
        let hit = |id: &str, distance: f32| IndexHit {
            id: id.to_string(),
            text: String::new(),
            metadata: entry(id, vec![]).metadata,
            distance,
        };
        let hits = take_nearest(vec![hit("b", 0.5), hit("a", 0.5), hit("c", 0.1)], 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
