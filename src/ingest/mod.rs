//! Data ingestion adapters.
//!
//! Converts heterogeneous inputs (free text, document page sets,
//! structured records, conversation turns) into chunked, annotated
//! chunks and writes them into the target partition. Writes are flushed
//! by the store before the call returns.

mod chunker;
mod formatters;

pub use chunker::{Chunker, ChunkerConfig};
pub use formatters::render_record;

use serde_json::Value;

use crate::errors::ApiError;
use crate::registry::Partition;
use crate::store::Chunk;

pub struct Ingestor {
    chunker: Chunker,
}

impl Ingestor {
    pub fn new(chunker: Chunker) -> Self {
        Self { chunker }
    }

    /// Ingest free text. Returns the number of chunks written.
    pub async fn ingest_text(
        &self,
        partition: &Partition,
        text: &str,
        source: &str,
    ) -> Result<usize, ApiError> {
        let chunks: Vec<Chunk> = self
            .chunker
            .split(text)
            .into_iter()
            .map(|piece| {
                Chunk::new(piece, partition.source().as_str()).with_meta("source", source)
            })
            .collect();

        let written = partition.add(chunks).await?;
        tracing::info!(
            "Ingested {} chunks into {} from {}",
            written,
            partition.collection(),
            source
        );
        Ok(written)
    }

    /// Ingest a document set (e.g. pages extracted from a PDF). Each
    /// page is chunked independently; all chunks share the source label.
    pub async fn ingest_documents(
        &self,
        partition: &Partition,
        pages: &[String],
        source: &str,
    ) -> Result<usize, ApiError> {
        let mut chunks = Vec::new();
        for (page_index, page) in pages.iter().enumerate() {
            for piece in self.chunker.split(page) {
                chunks.push(
                    Chunk::new(piece, partition.source().as_str())
                        .with_meta("source", source)
                        .with_meta("page", (page_index + 1).to_string()),
                );
            }
        }

        let written = partition.add(chunks).await?;
        tracing::info!(
            "Ingested {} chunks into {} from {} ({} pages)",
            written,
            partition.collection(),
            source,
            pages.len()
        );
        Ok(written)
    }

    /// Ingest a structured record, rendered to descriptive text by the
    /// type-specific formatter. The raw record is kept in metadata.
    pub async fn ingest_record(
        &self,
        partition: &Partition,
        data: &Value,
        data_type: &str,
    ) -> Result<usize, ApiError> {
        let rendered = render_record(data, data_type);
        let raw = serde_json::to_string(data).map_err(ApiError::internal)?;

        let chunks: Vec<Chunk> = self
            .chunker
            .split(&rendered)
            .into_iter()
            .map(|piece| {
                Chunk::new(piece, partition.source().as_str())
                    .with_meta("data_type", data_type)
                    .with_meta("original_data", raw.clone())
            })
            .collect();

        let written = partition.add(chunks).await?;
        tracing::info!(
            "Ingested {} data mart chunks of type {}",
            written,
            data_type
        );
        Ok(written)
    }

    /// Ingest one conversation turn. The raw user input and raw model
    /// output are carried in metadata verbatim so the turn can be
    /// replayed without re-parsing the formatted pair.
    pub async fn ingest_turn(
        &self,
        partition: &Partition,
        user_input: &str,
        ai_response: &str,
    ) -> Result<usize, ApiError> {
        let turn_text = format!("User: {}\nAssistant: {}", user_input, ai_response);

        let chunks: Vec<Chunk> = self
            .chunker
            .split(&turn_text)
            .into_iter()
            .map(|piece| {
                Chunk::new(piece, partition.source().as_str())
                    .with_meta("user_input", user_input)
                    .with_meta("ai_response", ai_response)
            })
            .collect();

        partition.add(chunks).await
    }
}
