//! Fire-and-forget conversation persistence.
//!
//! The response path never waits on history writes. Each user gets a
//! dedicated sequential queue so turns land in send order even under
//! concurrent requests; write failures are logged and swallowed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::ingest::Ingestor;
use crate::registry::{CollectionRegistry, SourceType};

struct Turn {
    user_input: String,
    ai_response: String,
}

pub struct HistoryRecorder {
    registry: Arc<CollectionRegistry>,
    ingestor: Arc<Ingestor>,
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<Turn>>>,
}

impl HistoryRecorder {
    pub fn new(registry: Arc<CollectionRegistry>, ingestor: Arc<Ingestor>) -> Self {
        Self {
            registry,
            ingestor,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue one turn for the user's history partition and return
    /// immediately. The first turn for a user spawns that user's writer
    /// task.
    pub fn record(&self, user_id: &str, user_input: &str, ai_response: &str) {
        let turn = Turn {
            user_input: user_input.to_string(),
            ai_response: ai_response.to_string(),
        };

        let mut queues = self.queues.lock().expect("queue map poisoned");
        let sender = queues
            .entry(user_id.to_string())
            .or_insert_with(|| self.spawn_writer(user_id));

        if sender.send(turn).is_err() {
            tracing::warn!("History queue for {} is closed; turn dropped", user_id);
        }
    }

    fn spawn_writer(&self, user_id: &str) -> mpsc::UnboundedSender<Turn> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Turn>();
        let registry = self.registry.clone();
        let ingestor = self.ingestor.clone();
        let user = user_id.to_string();

        tokio::spawn(async move {
            while let Some(turn) = rx.recv().await {
                let partition = match registry
                    .get_or_create(SourceType::ConversationHistory, &user)
                    .await
                {
                    Ok(partition) => partition,
                    Err(err) => {
                        tracing::warn!(
                            "Failed to resolve history partition for {}: {}",
                            user,
                            err
                        );
                        continue;
                    }
                };

                if let Err(err) = ingestor
                    .ingest_turn(&partition, &turn.user_input, &turn.ai_response)
                    .await
                {
                    tracing::warn!("Failed to persist turn for {}: {}", user, err);
                }
            }
        });

        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::ingest::Chunker;
    use crate::registry::SourceType;
    use crate::store::SqliteSimilarityStore;
    use crate::testing::{temp_db, StubEmbedder};

    async fn wait_for_count(
        registry: &CollectionRegistry,
        user: &str,
        expected: usize,
    ) -> usize {
        let partition = registry
            .get_or_create(SourceType::ConversationHistory, user)
            .await
            .unwrap();
        for _ in 0..200 {
            let count = partition.count().await.unwrap();
            if count >= expected {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        partition.count().await.unwrap()
    }

    #[tokio::test]
    async fn recorded_turns_become_retrievable() {
        let (_dir, path) = temp_db();
        let store = SqliteSimilarityStore::new(path, Arc::new(StubEmbedder))
            .await
            .unwrap();
        let registry = Arc::new(CollectionRegistry::new(Arc::new(store)));
        let recorder = HistoryRecorder::new(
            registry.clone(),
            Arc::new(Ingestor::new(Chunker::default())),
        );

        recorder.record("gina", "What drove Q3 churn?", "Churn rose with onboarding friction.");

        assert_eq!(wait_for_count(&registry, "gina", 1).await, 1);

        let partition = registry
            .get_or_create(SourceType::ConversationHistory, "gina")
            .await
            .unwrap();
        let results = partition.query("What drove Q3 churn?", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.meta("user_input"), Some("What drove Q3 churn?"));
    }

    #[tokio::test]
    async fn turns_for_one_user_are_written_in_order() {
        let (_dir, path) = temp_db();
        let store = SqliteSimilarityStore::new(path, Arc::new(StubEmbedder))
            .await
            .unwrap();
        let registry = Arc::new(CollectionRegistry::new(Arc::new(store)));
        let recorder = HistoryRecorder::new(
            registry.clone(),
            Arc::new(Ingestor::new(Chunker::default())),
        );

        for i in 0..5 {
            recorder.record("henry", &format!("question {i}"), &format!("answer {i}"));
        }

        assert_eq!(wait_for_count(&registry, "henry", 5).await, 5);

        // All five turns landed through the single per-user writer.
        let partition = registry
            .get_or_create(SourceType::ConversationHistory, "henry")
            .await
            .unwrap();
        let results = partition.query("question", 5).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn unreachable_store_drops_turns_without_panicking() {
        use async_trait::async_trait;

        use crate::errors::ApiError;
        use crate::store::{Chunk, ScoredChunk, SimilarityStore};

        struct DownStore;

        #[async_trait]
        impl SimilarityStore for DownStore {
            async fn ensure_collection(&self, _c: &str) -> Result<(), ApiError> {
                Err(ApiError::StoreUnavailable("down".to_string()))
            }
            async fn add(&self, _c: &str, _chunks: Vec<Chunk>) -> Result<usize, ApiError> {
                Err(ApiError::StoreUnavailable("down".to_string()))
            }
            async fn query(
                &self,
                _c: &str,
                _t: &str,
                _k: usize,
            ) -> Result<Vec<ScoredChunk>, ApiError> {
                Err(ApiError::StoreUnavailable("down".to_string()))
            }
            async fn clear(&self, _c: &str) -> Result<usize, ApiError> {
                Err(ApiError::StoreUnavailable("down".to_string()))
            }
            async fn count(&self, _c: &str) -> Result<usize, ApiError> {
                Err(ApiError::StoreUnavailable("down".to_string()))
            }
        }

        let registry = Arc::new(CollectionRegistry::new(Arc::new(DownStore)));
        let recorder = HistoryRecorder::new(
            registry.clone(),
            Arc::new(Ingestor::new(Chunker::default())),
        );

        recorder.record("iris", "hello", "world");
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Nothing to assert beyond "no panic"; the failure is logged.
    }
}
