//! Azure OpenAI client.
//!
//! Speaks the deployments API for chat completions and embeddings. The
//! endpoint and deployments come from config; the API key comes from
//! the environment only.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{ChatMessage, LlmProvider};
use crate::errors::ApiError;
use crate::store::Embedder;

#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
    pub embedding_deployment: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl AzureOpenAiConfig {
    /// Resolve from the merged config, with environment overrides for
    /// endpoint and key (`AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_KEY`).
    pub fn from_config(config: &Value) -> Result<Self, ApiError> {
        let section = config.get("generation").cloned().unwrap_or(Value::Null);

        let endpoint = std::env::var("AZURE_OPENAI_ENDPOINT")
            .ok()
            .or_else(|| read_string(&section, "endpoint"))
            .ok_or_else(|| {
                ApiError::BadRequest("Azure OpenAI endpoint is not configured".to_string())
            })?;

        let api_key = std::env::var("AZURE_OPENAI_API_KEY").map_err(|_| {
            ApiError::BadRequest("AZURE_OPENAI_API_KEY is not set".to_string())
        })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            api_version: read_string(&section, "api_version")
                .unwrap_or_else(|| "2024-02-01".to_string()),
            deployment: read_string(&section, "deployment")
                .unwrap_or_else(|| "gpt-4".to_string()),
            embedding_deployment: read_string(&section, "embedding_deployment")
                .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            temperature: section
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(0.1),
            max_tokens: section
                .get("max_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(2000) as u32,
        })
    }
}

fn read_string(section: &Value, key: &str) -> Option<String> {
    section
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Clone)]
pub struct AzureOpenAiProvider {
    config: AzureOpenAiConfig,
    client: Client,
}

impl AzureOpenAiProvider {
    pub fn new(config: AzureOpenAiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.config.endpoint, deployment, operation, self.config.api_version
        )
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn name(&self) -> &str {
        "azure_openai"
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let url = self.deployment_url(&self.config.deployment, "chat/completions");

        let body = json!({
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let res = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::GenerationFailed(format!(
                "Azure OpenAI chat error ({status}): {text}"
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::generation)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if content.is_empty() {
            return Err(ApiError::GenerationFailed(
                "Azure OpenAI returned an empty completion".to_string(),
            ));
        }

        Ok(content)
    }
}

#[async_trait]
impl Embedder for AzureOpenAiProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = self.deployment_url(&self.config.embedding_deployment, "embeddings");

        let body = json!({ "input": inputs });

        let res = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::store)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::StoreUnavailable(format!(
                "Azure OpenAI embeddings error ({status}): {text}"
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::store)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(values) = item["embedding"].as_array() {
                    let vector: Vec<f32> = values
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vector);
                }
            }
        }

        Ok(embeddings)
    }
}
