//! Shared test doubles for the engine's collaborator traits.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::errors::ApiError;
use crate::llm::{ChatMessage, LlmProvider};
use crate::store::Embedder;

const STUB_DIM: usize = 64;

/// Deterministic bag-of-words embedder. Texts sharing words embed close
/// together, which is enough to make similarity search meaningful in
/// tests without a model.
pub struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|text| bag_of_words(text)).collect())
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; STUB_DIM];
    for word in text.to_lowercase().split_whitespace() {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        vector[(hasher.finish() % STUB_DIM as u64) as usize] += 1.0;
    }
    vector
}

/// Generation stub that echoes a canned answer.
pub struct StubGenerator {
    pub reply: String,
}

impl StubGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for StubGenerator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn chat(&self, _messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        Ok(self.reply.clone())
    }
}

/// Generation stub that always fails, for fatal-path tests.
pub struct FailingGenerator;

#[async_trait]
impl LlmProvider for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn chat(&self, _messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        Err(ApiError::GenerationFailed("model offline".to_string()))
    }
}

/// A throwaway SQLite path. Keep the returned guard alive for the
/// duration of the test.
pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mimir_test.db");
    (dir, path)
}
