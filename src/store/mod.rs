//! Similarity-store abstraction for knowledge partitions.
//!
//! The engine only sees named collections of chunks with text-in,
//! ranked-chunks-out semantics. Embedding happens inside the store
//! implementation and is opaque to every caller.

mod sqlite;

pub use sqlite::SqliteSimilarityStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// A bounded unit of text plus metadata, the atomic unit of storage
/// and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Create a chunk stamped with its source type and ingestion time.
    pub fn new(text: impl Into<String>, source_type: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source_type".to_string(), source_type.to_string());
        metadata.insert("ingested_at".to_string(), Utc::now().to_rfc3339());

        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Result of a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Similarity score (higher = better).
    pub score: f32,
}

/// Text → fixed-length vector. Used by store implementations; the rest
/// of the engine never touches vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Abstract interface over the vector database.
///
/// Collections are created on first access and never implicitly
/// deleted; `clear` empties a collection but leaves it registered so
/// subsequent writes need no re-registration.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Register a collection if it does not exist. Idempotent.
    async fn ensure_collection(&self, collection: &str) -> Result<(), ApiError>;

    /// Append chunks to a collection. Writes are flushed before the
    /// call returns. Returns the number of chunks written.
    async fn add(&self, collection: &str, chunks: Vec<Chunk>) -> Result<usize, ApiError>;

    /// Return up to `k` chunks ranked by similarity to `text`.
    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, ApiError>;

    /// Delete every chunk in a collection, keeping the collection
    /// itself. Returns the number of chunks removed.
    async fn clear(&self, collection: &str) -> Result<usize, ApiError>;

    /// Number of chunks currently stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize, ApiError>;
}
