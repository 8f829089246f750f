use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging / diagnostics.
    fn name(&self) -> &str;

    /// Chat completion (non-streaming). Failures here are fatal to the
    /// request they serve.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError>;
}
