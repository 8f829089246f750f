//! Fan-out retriever.
//!
//! Issues one similarity query per in-scope partition, each bounded to
//! a per-source share of the request's fragment budget, then joins the
//! results. A failure or timeout in one source degrades that source to
//! zero fragments; it never fails the request. No cross-source
//! re-ranking is performed: results keep source-declaration order and
//! the concatenated list is cut at the budget.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::registry::{CollectionRegistry, SourceType};
use crate::store::Chunk;

/// Conversation history is always queried with at least this many
/// slots, even when the computed share is zero.
const HISTORY_MIN_FRAGMENTS: usize = 1;
/// And never more than this many.
const HISTORY_MAX_FRAGMENTS: usize = 3;

/// Request-scoped retrieval parameters. Never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub user_id: String,
    pub role: String,
    pub session_id: String,
    pub data_sources: Vec<SourceType>,
    pub max_fragments: usize,
    pub max_context_chars: usize,
}

/// A retrieved chunk tagged with its originating partition kind.
#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub chunk: Chunk,
    pub source: SourceType,
    pub score: f32,
}

pub struct FanOutRetriever {
    registry: Arc<CollectionRegistry>,
    source_timeout: Duration,
}

impl FanOutRetriever {
    pub fn new(registry: Arc<CollectionRegistry>, source_timeout: Duration) -> Self {
        Self {
            registry,
            source_timeout,
        }
    }

    /// Query every in-scope partition concurrently and join the
    /// results. Infallible by design: per-source errors degrade to
    /// empty and are logged at the boundary.
    pub async fn retrieve(&self, query: &str, ctx: &RetrievalContext) -> Vec<Fragment> {
        if ctx.data_sources.is_empty() || ctx.max_fragments == 0 {
            return Vec::new();
        }

        let share = ctx.max_fragments / ctx.data_sources.len();

        let tasks = ctx.data_sources.iter().map(|&source| {
            let quota = match source {
                SourceType::ConversationHistory => {
                    share.clamp(HISTORY_MIN_FRAGMENTS, HISTORY_MAX_FRAGMENTS)
                }
                _ => share,
            };
            self.query_source(query, source, ctx, quota)
        });

        let mut fragments: Vec<Fragment> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .flatten()
            .collect();

        // Hard budget ceiling across all sources.
        fragments.truncate(ctx.max_fragments);

        tracing::info!(
            "Retrieved {} fragments from {} sources",
            fragments.len(),
            ctx.data_sources.len()
        );
        fragments
    }

    async fn query_source(
        &self,
        query: &str,
        source: SourceType,
        ctx: &RetrievalContext,
        k: usize,
    ) -> Vec<Fragment> {
        if k == 0 {
            tracing::debug!("Source {} skipped: zero quota", source);
            return Vec::new();
        }

        let owner = match source {
            SourceType::UserDocuments | SourceType::ConversationHistory => ctx.user_id.as_str(),
            SourceType::RoleSpecific => ctx.role.as_str(),
            SourceType::CommonKnowledge | SourceType::DataMart => "",
        };

        let lookup = async {
            let partition = self.registry.get_or_create(source, owner).await?;
            partition.query(query, k).await
        };

        match tokio::time::timeout(self.source_timeout, lookup).await {
            Ok(Ok(results)) => results
                .into_iter()
                .map(|scored| Fragment {
                    chunk: scored.chunk,
                    source,
                    score: scored.score,
                })
                .collect(),
            Ok(Err(err)) => {
                tracing::warn!("Source {} degraded to empty: {}", source, err);
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    "Source {} timed out after {:?}, degraded to empty",
                    source,
                    self.source_timeout
                );
                Vec::new()
            }
        }
    }
}
