//! Inference and persistence orchestrator.
//!
//! One request flows select → retrieve → compose → generate → persist.
//! Retrieval degradation is absorbed upstream; a generation failure is
//! fatal and surfaces to the caller; persistence is fire-and-forget and
//! never fails the answer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::compose::ContextComposer;
use crate::config::EngineSettings;
use crate::errors::ApiError;
use crate::ingest::Ingestor;
use crate::llm::{ChatMessage, LlmProvider};
use crate::persist::HistoryRecorder;
use crate::registry::{CollectionRegistry, SourceType};
use crate::retrieval::{FanOutRetriever, Fragment, RetrievalContext, SourceSelector};

/// The answer returned to the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    /// Source types that actually contributed fragments, in section order.
    pub sources_used: Vec<String>,
}

pub struct ChatEngine {
    settings: EngineSettings,
    selector: SourceSelector,
    retriever: FanOutRetriever,
    composer: ContextComposer,
    llm: Arc<dyn LlmProvider>,
    recorder: HistoryRecorder,
}

impl ChatEngine {
    pub fn new(
        settings: EngineSettings,
        registry: Arc<CollectionRegistry>,
        ingestor: Arc<Ingestor>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let retriever = FanOutRetriever::new(
            registry.clone(),
            Duration::from_millis(settings.source_timeout_ms),
        );
        let recorder = HistoryRecorder::new(registry, ingestor);

        Self {
            settings,
            selector: SourceSelector::default(),
            retriever,
            composer: ContextComposer::new(),
            llm,
            recorder,
        }
    }

    /// Answer one question for one user.
    pub async fn answer_query(
        &self,
        user_id: &str,
        role: &str,
        query: &str,
        explicit_sources: Option<&[String]>,
        session_id: Option<String>,
    ) -> Result<Answer, ApiError> {
        tracing::debug!(phase = "selecting", user = user_id, role = role);
        let data_sources = self.selector.select(role, explicit_sources);

        let ctx = RetrievalContext {
            user_id: user_id.to_string(),
            role: role.to_string(),
            session_id: session_id
                .unwrap_or_else(|| format!("{}_{}", user_id, Utc::now().to_rfc3339())),
            data_sources,
            max_fragments: self.settings.max_fragments,
            max_context_chars: self.settings.max_context_chars,
        };

        tracing::debug!(phase = "retrieving", sources = ctx.data_sources.len());
        let fragments = self.retriever.retrieve(query, &ctx).await;

        tracing::debug!(phase = "composing", fragments = fragments.len());
        let prompt = self.composer.compose(query, &fragments, &ctx);

        tracing::debug!(phase = "generating", prompt_chars = prompt.chars().count());
        let response = self.llm.chat(vec![ChatMessage::user(prompt)]).await?;

        tracing::debug!(phase = "persisting", user = user_id);
        self.recorder.record(user_id, query, &response);

        Ok(Answer {
            sources_used: sources_used(&fragments),
            response,
        })
    }
}

fn sources_used(fragments: &[Fragment]) -> Vec<String> {
    SourceType::ALL
        .into_iter()
        .filter(|source| fragments.iter().any(|f| f.source == *source))
        .map(|source| source.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::ingest::Chunker;
    use crate::store::SqliteSimilarityStore;
    use crate::testing::{temp_db, FailingGenerator, StubEmbedder, StubGenerator};

    struct Harness {
        _dir: tempfile::TempDir,
        registry: Arc<CollectionRegistry>,
        ingestor: Arc<Ingestor>,
    }

    async fn harness() -> Harness {
        let (dir, path) = temp_db();
        let store = SqliteSimilarityStore::new(path, Arc::new(StubEmbedder))
            .await
            .unwrap();
        Harness {
            _dir: dir,
            registry: Arc::new(CollectionRegistry::new(Arc::new(store))),
            ingestor: Arc::new(Ingestor::new(Chunker::default())),
        }
    }

    fn engine(harness: &Harness, llm: Arc<dyn LlmProvider>) -> ChatEngine {
        ChatEngine::new(
            EngineSettings::default(),
            harness.registry.clone(),
            harness.ingestor.clone(),
            llm,
        )
    }

    async fn history_count(harness: &Harness, user: &str) -> usize {
        let partition = harness
            .registry
            .get_or_create(SourceType::ConversationHistory, user)
            .await
            .unwrap();
        for _ in 0..200 {
            let count = partition.count().await.unwrap();
            if count > 0 {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        0
    }

    #[tokio::test]
    async fn answers_with_context_and_reports_contributing_sources() {
        let harness = harness().await;

        let docs = harness
            .registry
            .get_or_create(SourceType::UserDocuments, "judy")
            .await
            .unwrap();
        harness
            .ingestor
            .ingest_text(&docs, "Tournament retention grew 12% quarter over quarter.", "report")
            .await
            .unwrap();

        let engine = engine(&harness, Arc::new(StubGenerator::new("Retention grew 12%.")));
        let answer = engine
            .answer_query("judy", "Guest", "How did tournament retention change?", None, None)
            .await
            .unwrap();

        assert_eq!(answer.response, "Retention grew 12%.");
        assert!(answer
            .sources_used
            .contains(&"user_documents".to_string()));
    }

    #[tokio::test]
    async fn empty_partitions_still_answer() {
        let harness = harness().await;
        let engine = engine(&harness, Arc::new(StubGenerator::new("I lack context.")));

        let answer = engine
            .answer_query("kate", "Guest", "Anything on file?", None, None)
            .await
            .unwrap();

        assert_eq!(answer.response, "I lack context.");
        assert!(answer.sources_used.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_is_fatal() {
        let harness = harness().await;
        let engine = engine(&harness, Arc::new(FailingGenerator));

        let result = engine
            .answer_query("liam", "Guest", "Hello?", None, None)
            .await;

        assert!(matches!(result, Err(ApiError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn answered_turns_are_persisted_and_retrievable() {
        let harness = harness().await;
        let engine = engine(&harness, Arc::new(StubGenerator::new("The answer is 42.")));

        engine
            .answer_query("mona", "Guest", "What is the answer to everything?", None, None)
            .await
            .unwrap();

        assert!(history_count(&harness, "mona").await > 0);

        let history = harness
            .registry
            .get_or_create(SourceType::ConversationHistory, "mona")
            .await
            .unwrap();
        let results = history
            .query("What is the answer to everything?", 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("What is the answer to everything?"));
        assert_eq!(results[0].chunk.meta("ai_response"), Some("The answer is 42."));
    }

    #[tokio::test]
    async fn explicit_sources_narrow_retrieval() {
        let harness = harness().await;

        let docs = harness
            .registry
            .get_or_create(SourceType::UserDocuments, "nina")
            .await
            .unwrap();
        harness
            .ingestor
            .ingest_text(&docs, "Personal planning notes about roadmap reviews.", "notes")
            .await
            .unwrap();

        let engine = engine(&harness, Arc::new(StubGenerator::new("ok")));
        let requested = vec!["common_knowledge".to_string()];
        let answer = engine
            .answer_query("nina", "Guest", "roadmap reviews", Some(&requested), None)
            .await
            .unwrap();

        // User documents were not in scope, so they cannot contribute.
        assert!(!answer.sources_used.contains(&"user_documents".to_string()));
    }
}
