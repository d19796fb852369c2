//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian `f32` BLOBs (see
//! [`vec_to_blob`](crate::embedding::vec_to_blob)) in the `entries` table,
//! keyed by `(collection, id)`. Similarity is computed in Rust by a
//! brute-force scan over the collection, which is adequate for knowledge
//! bases of a few thousand chunks.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{check_batch_dims, check_query_dims, take_nearest, VectorIndex};
use crate::config::DbConfig;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::RagError;
use crate::migrate;
use crate::models::{ChunkMetadata, IndexEntry, IndexHit};

fn index_err(e: impl std::fmt::Display) -> RagError {
    RagError::Index(e.to_string())
}

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

impl SqliteIndex {
    /// Open (creating if needed) `collection` in an already connected database.
    pub async fn open(pool: SqlitePool, collection: &str) -> Result<Self> {
        migrate::run_migrations(&pool).await?;
        sqlx::query("INSERT OR IGNORE INTO collections (name, dims, updated_at) VALUES (?, NULL, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&pool)
            .await
            .map_err(index_err)?;
        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    /// Connect to the configured database file and open its collection.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        Self::open(pool, &config.collection).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;
        sqlx::query("DELETE FROM entries WHERE collection = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        sqlx::query("UPDATE collections SET dims = NULL, updated_at = ? WHERE name = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(&self.collection)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        tx.commit().await.map_err(index_err)?;
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(index_err)?;

        let current: Option<i64> =
            sqlx::query_scalar::<_, Option<i64>>("SELECT dims FROM collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_optional(&mut *tx)
                .await
                .map_err(index_err)?
                .flatten();
        let dims = check_batch_dims(current.map(|d| d as usize), entries)?;

        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.metadata).map_err(index_err)?;
            sqlx::query(
                r#"
                INSERT INTO entries
                    (collection, id, document_id, sequence, text, metadata_json, embedding, placeholder)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document_id = excluded.document_id,
                    sequence = excluded.sequence,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    placeholder = excluded.placeholder
                "#,
            )
            .bind(&self.collection)
            .bind(&entry.id)
            .bind(&entry.metadata.document_id)
            .bind(entry.metadata.sequence as i64)
            .bind(&entry.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&entry.vector))
            .bind(entry.placeholder)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        }

        sqlx::query("UPDATE collections SET dims = ?, updated_at = ? WHERE name = ?")
            .bind(dims.map(|d| d as i64))
            .bind(chrono::Utc::now().timestamp())
            .bind(&self.collection)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;

        tx.commit().await.map_err(index_err)?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;
        let mut removed = 0u64;
        for id in ids {
            let result = sqlx::query("DELETE FROM entries WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(index_err)?;
            removed += result.rows_affected();
        }
        tx.commit().await.map_err(index_err)?;
        Ok(removed)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        check_query_dims(self.dims().await?, vector)?;

        let rows = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM entries \
             WHERE collection = ? AND placeholder = 0",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let metadata_json: String = row.try_get("metadata_json").map_err(index_err)?;
            let metadata: ChunkMetadata =
                serde_json::from_str(&metadata_json).map_err(index_err)?;
            let blob: Vec<u8> = row.try_get("embedding").map_err(index_err)?;
            hits.push(IndexHit {
                id: row.try_get("id").map_err(index_err)?,
                text: row.try_get("text").map_err(index_err)?,
                metadata,
                distance: cosine_distance(vector, &blob_to_vec(&blob)),
            });
        }
        Ok(take_nearest(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(count as usize)
    }

    async fn dims(&self) -> Result<Option<usize>> {
        let dims: Option<i64> =
            sqlx::query_scalar::<_, Option<i64>>("SELECT dims FROM collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_optional(&self.pool)
                .await
                .map_err(index_err)?
                .flatten();
        Ok(dims.map(|d| d as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::conformance::{self, entry};

    fn db_config(dir: &tempfile::TempDir, collection: &str) -> DbConfig {
        DbConfig {
            path: dir.path().join("data").join("kb.sqlite"),
            collection: collection.to_string(),
        }
    }

    #[tokio::test]
    async fn test_sqlite_index_conformance() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::connect(&db_config(&dir, "kb")).await.unwrap();
        conformance::run_all(&index).await;
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = db_config(&dir, "kb");
        {
            let index = SqliteIndex::connect(&config).await.unwrap();
            index
                .upsert(&[entry("a_0", vec![1.0, 0.0]), entry("b_0", vec![0.0, 1.0])])
                .await
                .unwrap();
            index.close().await;
        }

        let index = SqliteIndex::connect(&config).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
        assert_eq!(index.dims().await.unwrap(), Some(2));
        let hits = index.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "b_0");
        assert_eq!(hits[0].metadata.document_id, "b");
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(&db_config(&dir, "unused")).await.unwrap();
        let first = SqliteIndex::open(pool.clone(), "first").await.unwrap();
        let second = SqliteIndex::open(pool, "second").await.unwrap();

        first.upsert(&[entry("a_0", vec![1.0, 0.0])]).await.unwrap();
        second
            .upsert(&[entry("a_0", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(first.count().await.unwrap(), 1);
        assert_eq!(second.dims().await.unwrap(), Some(3));

        second.clear().await.unwrap();
        assert_eq!(first.count().await.unwrap(), 1);
    }
}
