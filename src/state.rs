use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{AppPaths, ConfigService};
use crate::ingest::{Chunker, ChunkerConfig, Ingestor};
use crate::llm::{AzureOpenAiConfig, AzureOpenAiProvider};
use crate::orchestrator::ChatEngine;
use crate::registry::CollectionRegistry;
use crate::store::SqliteSimilarityStore;

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub registry: Arc<CollectionRegistry>,
    pub ingestor: Arc<Ingestor>,
    pub engine: Arc<ChatEngine>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Construct the full dependency graph once at startup. Every
    /// shared resource is built here and injected; nothing is created
    /// lazily on first use.
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = config.engine_settings();

        let provider = Arc::new(AzureOpenAiProvider::new(AzureOpenAiConfig::from_config(
            &config.load_config()?,
        )?));

        let store =
            SqliteSimilarityStore::new(paths.db_path.clone(), provider.clone()).await?;
        let registry = Arc::new(CollectionRegistry::new(Arc::new(store)));

        let ingestor = Arc::new(Ingestor::new(Chunker::new(ChunkerConfig {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        })));

        let engine = Arc::new(ChatEngine::new(
            settings,
            registry.clone(),
            ingestor.clone(),
            provider,
        ));

        Ok(Arc::new(AppState {
            paths,
            config,
            registry,
            ingestor,
            engine,
            started_at: Utc::now(),
        }))
    }
}
