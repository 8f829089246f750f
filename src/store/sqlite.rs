//! SQLite-backed similarity store.
//!
//! In-process vector store using SQLite for chunk rows and brute-force
//! cosine similarity for search. Embeddings are computed through the
//! injected `Embedder` on write and on query.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{Chunk, Embedder, ScoredChunk, SimilarityStore};
use crate::errors::ApiError;

pub struct SqliteSimilarityStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteSimilarityStore {
    pub async fn new(db_path: PathBuf, embedder: Arc<dyn Embedder>) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::store)?;

        let store = Self { pool, embedder };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
        let metadata_str: String = row.get("metadata");
        let metadata =
            serde_json::from_str::<BTreeMap<String, String>>(&metadata_str).unwrap_or_default();

        Chunk {
            text: row.get("content"),
            metadata,
        }
    }
}

#[async_trait]
impl SimilarityStore for SqliteSimilarityStore {
    async fn ensure_collection(&self, collection: &str) -> Result<(), ApiError> {
        sqlx::query("INSERT OR IGNORE INTO collections (name) VALUES (?1)")
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(())
    }

    async fn add(&self, collection: &str, chunks: Vec<Chunk>) -> Result<usize, ApiError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Internal(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::store)?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str =
                serde_json::to_string(&chunk.metadata).map_err(ApiError::internal)?;

            sqlx::query(
                "INSERT INTO chunks (chunk_id, collection, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(collection)
            .bind(&chunk.text)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::store)?;
        }

        tx.commit().await.map_err(ApiError::store)?;
        Ok(chunks.len())
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(std::slice::from_ref(&text.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("Embedder returned no vector".to_string()))?;

        let rows = sqlx::query(
            "SELECT content, metadata, embedding FROM chunks WHERE collection = ?1",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::store)?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(&query_embedding, &stored);

                Some(ScoredChunk {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn clear(&self, collection: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM chunks WHERE collection = ?1")
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, collection: &str) -> Result<usize, ApiError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?1")
                .bind(collection)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::store)?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{temp_db, StubEmbedder};
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteSimilarityStore) {
        let (dir, path) = temp_db();
        let store = SqliteSimilarityStore::new(path, Arc::new(StubEmbedder))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_then_query_returns_matching_chunk() {
        let (_dir, store) = test_store().await;
        store.ensure_collection("docs").await.unwrap();

        let chunks = vec![
            Chunk::new("Player retention improved after the tournament update", "user_documents"),
            Chunk::new("The cafeteria menu rotates weekly", "user_documents"),
        ];
        let written = store.add("docs", chunks).await.unwrap();
        assert_eq!(written, 2);

        let results = store
            .query("docs", "player retention tournament", 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("retention"));
    }

    #[tokio::test]
    async fn query_respects_limit() {
        let (_dir, store) = test_store().await;
        store.ensure_collection("docs").await.unwrap();

        let chunks: Vec<Chunk> = (0..10)
            .map(|i| Chunk::new(format!("gaming revenue note {i}"), "data_mart"))
            .collect();
        store.add("docs", chunks).await.unwrap();

        let results = store.query("docs", "gaming revenue", 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn clear_empties_but_collection_stays_writable() {
        let (_dir, store) = test_store().await;
        store.ensure_collection("docs").await.unwrap();

        store
            .add("docs", vec![Chunk::new("first batch", "common_knowledge")])
            .await
            .unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 1);

        let removed = store.clear("docs").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count("docs").await.unwrap(), 0);

        store
            .add("docs", vec![Chunk::new("second batch", "common_knowledge")])
            .await
            .unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let (_dir, store) = test_store().await;
        store.ensure_collection("a").await.unwrap();
        store.ensure_collection("b").await.unwrap();

        store
            .add("a", vec![Chunk::new("alpha content", "user_documents")])
            .await
            .unwrap();

        assert_eq!(store.count("a").await.unwrap(), 1);
        assert_eq!(store.count("b").await.unwrap(), 0);
        assert!(store.query("b", "alpha", 5).await.unwrap().is_empty());
    }
}
