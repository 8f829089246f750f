//! Collection registry.
//!
//! Maps logical knowledge partitions (per-user documents, shared
//! knowledge, business data, per-role guidance, per-user conversation
//! history) to named collections on the similarity store. Handles are
//! created lazily and cached for the life of the process; the store's
//! own create-if-missing semantics make concurrent first access for the
//! same key idempotent.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::errors::ApiError;
use crate::store::{Chunk, ScoredChunk, SimilarityStore};

const NAME_MAX_LEN: usize = 63;
// Truncation point + separator + hash suffix must stay within the limit.
const NAME_TRUNCATE_AT: usize = 54;
const HASH_SUFFIX_LEN: usize = 8;

/// The category of a knowledge partition, attached to every chunk and
/// used for grouping during composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    UserDocuments,
    CommonKnowledge,
    DataMart,
    RoleSpecific,
    ConversationHistory,
}

impl SourceType {
    /// Declaration order. Fan-out result ordering and composer section
    /// ordering both follow this.
    pub const ALL: [SourceType; 5] = [
        SourceType::UserDocuments,
        SourceType::CommonKnowledge,
        SourceType::DataMart,
        SourceType::RoleSpecific,
        SourceType::ConversationHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::UserDocuments => "user_documents",
            SourceType::CommonKnowledge => "common_knowledge",
            SourceType::DataMart => "data_mart",
            SourceType::RoleSpecific => "role_specific",
            SourceType::ConversationHistory => "conversation_history",
        }
    }

    pub fn parse(name: &str) -> Option<SourceType> {
        match name {
            "user_documents" => Some(SourceType::UserDocuments),
            "common_knowledge" => Some(SourceType::CommonKnowledge),
            "data_mart" => Some(SourceType::DataMart),
            "role_specific" => Some(SourceType::RoleSpecific),
            "conversation_history" => Some(SourceType::ConversationHistory),
            _ => None,
        }
    }

    /// Whether this partition kind is owned per user, per role, or shared.
    pub fn is_shared(&self) -> bool {
        matches!(self, SourceType::CommonKnowledge | SourceType::DataMart)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitize an owner-derived name to the store's naming constraints:
/// alphanumeric/hyphen/underscore, 1–63 characters, starting and ending
/// alphanumeric. Over-long names are truncated and disambiguated with a
/// content hash so distinct owners never collide.
pub fn sanitize_collection_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("static pattern"));
    let mut sanitized = invalid.replace_all(name, "_").to_string();

    let starts_ok = sanitized
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = sanitized
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        sanitized = format!("a{}1", sanitized);
    }

    // The hash suffix keeps truncated names unique per owner, and the
    // suffix itself ends alphanumeric so the edge constraint survives.
    if sanitized.len() > NAME_MAX_LEN {
        let digest = Sha256::digest(name.as_bytes());
        let suffix = &hex::encode(digest)[..HASH_SUFFIX_LEN];
        sanitized = format!("{}_{}", &sanitized[..NAME_TRUNCATE_AT], suffix);
    }

    sanitized
}

/// Deterministic collection name for a partition. Shared partitions
/// ignore the owner key.
pub fn collection_name(source: SourceType, owner: &str) -> String {
    match source {
        SourceType::UserDocuments => sanitize_collection_name(&format!("user_docs_{owner}")),
        SourceType::ConversationHistory => {
            sanitize_collection_name(&format!("chat_history_{owner}"))
        }
        SourceType::CommonKnowledge => "common_knowledge_base".to_string(),
        SourceType::DataMart => "data_mart_base".to_string(),
        SourceType::RoleSpecific => {
            let role = owner.to_lowercase().replace('-', "_");
            sanitize_collection_name(&format!("role_{role}"))
        }
    }
}

/// Handle on one partition. Cheap to clone; all operations go through
/// the shared store.
#[derive(Clone)]
pub struct Partition {
    source: SourceType,
    collection: String,
    store: Arc<dyn SimilarityStore>,
}

impl Partition {
    pub fn source(&self) -> SourceType {
        self.source
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn add(&self, chunks: Vec<Chunk>) -> Result<usize, ApiError> {
        self.store.add(&self.collection, chunks).await
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, ApiError> {
        self.store.query(&self.collection, text, k).await
    }

    pub async fn clear(&self) -> Result<usize, ApiError> {
        self.store.clear(&self.collection).await
    }

    pub async fn count(&self) -> Result<usize, ApiError> {
        self.store.count(&self.collection).await
    }
}

pub struct CollectionRegistry {
    store: Arc<dyn SimilarityStore>,
    handles: Mutex<HashMap<String, Partition>>,
}

impl CollectionRegistry {
    pub fn new(store: Arc<dyn SimilarityStore>) -> Self {
        Self {
            store,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a partition handle, registering the collection on first
    /// access. Idempotent; a lost insert race costs one redundant
    /// `ensure_collection` round-trip, never a divergent handle.
    pub async fn get_or_create(
        &self,
        source: SourceType,
        owner: &str,
    ) -> Result<Partition, ApiError> {
        let name = collection_name(source, owner);

        {
            let handles = self.handles.lock().await;
            if let Some(handle) = handles.get(&name) {
                return Ok(handle.clone());
            }
        }

        self.store.ensure_collection(&name).await?;

        let handle = Partition {
            source,
            collection: name.clone(),
            store: self.store.clone(),
        };

        let mut handles = self.handles.lock().await;
        Ok(handles.entry(name).or_insert(handle).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteSimilarityStore;
    use crate::testing::{temp_db, StubEmbedder};

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_collection_name("user@example.com");
        let twice = sanitize_collection_name(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "user_example_com");
    }

    #[test]
    fn sanitize_enforces_length_and_charset() {
        let long_name = "x".repeat(200) + "@domain";
        let sanitized = sanitize_collection_name(&long_name);

        assert!(sanitized.len() <= 63);
        assert!(sanitized.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert!(sanitized.chars().next().unwrap().is_ascii_alphanumeric());
        assert!(sanitized.chars().last().unwrap().is_ascii_alphanumeric());
    }

    #[test]
    fn long_names_with_distinct_owners_do_not_collide() {
        let a = sanitize_collection_name(&format!("{}alpha", "x".repeat(100)));
        let b = sanitize_collection_name(&format!("{}omega", "x".repeat(100)));
        assert_ne!(a, b);
    }

    #[test]
    fn sanitize_pads_non_alphanumeric_edges() {
        let sanitized = sanitize_collection_name("_user_");
        assert!(sanitized.chars().next().unwrap().is_ascii_alphanumeric());
        assert!(sanitized.chars().last().unwrap().is_ascii_alphanumeric());
    }

    #[test]
    fn collection_names_follow_partition_kind() {
        assert_eq!(
            collection_name(SourceType::UserDocuments, "alice@example.com"),
            "user_docs_alice_example_com"
        );
        assert_eq!(
            collection_name(SourceType::ConversationHistory, "alice@example.com"),
            "chat_history_alice_example_com"
        );
        assert_eq!(
            collection_name(SourceType::CommonKnowledge, "ignored"),
            "common_knowledge_base"
        );
        assert_eq!(collection_name(SourceType::DataMart, ""), "data_mart_base");
        assert_eq!(
            collection_name(SourceType::RoleSpecific, "Analyst-Gaming"),
            "role_analyst_gaming"
        );
    }

    #[test]
    fn source_type_round_trips_through_names() {
        for source in SourceType::ALL {
            assert_eq!(SourceType::parse(source.as_str()), Some(source));
        }
        assert_eq!(SourceType::parse("nonsense"), None);
    }

    #[tokio::test]
    async fn get_or_create_caches_handles() {
        let (_dir, path) = temp_db();
        let store = SqliteSimilarityStore::new(path, Arc::new(StubEmbedder))
            .await
            .unwrap();
        let registry = CollectionRegistry::new(Arc::new(store));

        let first = registry
            .get_or_create(SourceType::UserDocuments, "bob")
            .await
            .unwrap();
        let second = registry
            .get_or_create(SourceType::UserDocuments, "bob")
            .await
            .unwrap();

        assert_eq!(first.collection(), second.collection());
        assert_eq!(first.collection(), "user_docs_bob");
    }

    #[tokio::test]
    async fn cleared_partition_accepts_new_writes() {
        let (_dir, path) = temp_db();
        let store = SqliteSimilarityStore::new(path, Arc::new(StubEmbedder))
            .await
            .unwrap();
        let registry = CollectionRegistry::new(Arc::new(store));

        let partition = registry
            .get_or_create(SourceType::CommonKnowledge, "")
            .await
            .unwrap();
        partition
            .add(vec![Chunk::new("guide text", "common_knowledge")])
            .await
            .unwrap();

        partition.clear().await.unwrap();
        assert_eq!(partition.count().await.unwrap(), 0);

        partition
            .add(vec![Chunk::new("fresh guide text", "common_knowledge")])
            .await
            .unwrap();
        assert_eq!(partition.count().await.unwrap(), 1);
    }
}
