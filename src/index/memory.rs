//! In-memory [`VectorIndex`] for tests and ephemeral pipelines.
//!
//! Entries live in a `BTreeMap` behind `std::sync::RwLock`; queries are a
//! brute-force cosine scan.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use super::{check_batch_dims, check_query_dims, take_nearest, VectorIndex};
use crate::embedding::cosine_distance;
use crate::error::RagError;
use crate::models::{IndexEntry, IndexHit};

#[derive(Default)]
struct State {
    dims: Option<usize>,
    entries: BTreeMap<String, IndexEntry>,
}

pub struct MemoryIndex {
    collection: String,
    state: RwLock<State>,
}

impl MemoryIndex {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, RagError> {
        self.state
            .read()
            .map_err(|_| RagError::Index("memory index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, RagError> {
        self.state
            .write()
            .map_err(|_| RagError::Index("memory index lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.write()?;
        state.entries.clear();
        state.dims = None;
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.write()?;
        // Validate before touching the map so a bad batch changes nothing.
        let dims = check_batch_dims(state.dims, entries)?;
        state.dims = dims;
        for entry in entries {
            state.entries.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        let mut state = self.write()?;
        let removed = ids
            .iter()
            .filter(|id| state.entries.remove(id.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let state = self.read()?;
        check_query_dims(state.dims, vector)?;
        let hits = state
            .entries
            .values()
            .filter(|e| !e.placeholder)
            .map(|e| IndexHit {
                id: e.id.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                distance: cosine_distance(vector, &e.vector),
            })
            .collect();
        Ok(take_nearest(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }

    async fn dims(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dims)
    }
}
