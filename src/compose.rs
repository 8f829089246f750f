//! Context composer.
//!
//! Renders retrieved fragments into a single bounded prompt: fragments
//! grouped by source type into fixed, ordered sections, each fragment
//! cut at the per-fragment character ceiling, framed by a role-aware
//! opening and a closing instruction.

use crate::registry::SourceType;
use crate::retrieval::{Fragment, RetrievalContext};

pub struct ContextComposer;

impl ContextComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, query: &str, fragments: &[Fragment], ctx: &RetrievalContext) -> String {
        let mut parts = vec![
            format!("You are Mimir, an AI assistant for a {} user.", ctx.role),
            "Use the following context from multiple sources to answer the question."
                .to_string(),
            "Prioritize the most relevant and recent information.".to_string(),
            String::new(),
        ];

        if fragments.is_empty() {
            parts.push(
                "No relevant context was retrieved from the configured data sources."
                    .to_string(),
            );
            parts.push(String::new());
        }

        // Fixed section order, independent of retrieval order.
        for source in SourceType::ALL {
            let section: Vec<&Fragment> =
                fragments.iter().filter(|f| f.source == source).collect();
            if section.is_empty() {
                continue;
            }

            parts.push(section_header(source, &ctx.role));
            for fragment in section {
                parts.push(clip(&fragment.chunk.text, ctx.max_context_chars));
            }
            parts.push(String::new());
        }

        parts.push(format!("User Question: {}", query));
        parts.push(String::new());
        parts.push("Provide a comprehensive answer based on the available context.".to_string());
        parts.push(format!("Tailor your response to the {} perspective.", ctx.role));
        parts.push("If you don't have enough information, say so clearly.".to_string());

        parts.join("\n")
    }
}

impl Default for ContextComposer {
    fn default() -> Self {
        Self::new()
    }
}

fn section_header(source: SourceType, role: &str) -> String {
    match source {
        SourceType::UserDocuments => "=== USER DOCUMENTS ===".to_string(),
        SourceType::CommonKnowledge => "=== KNOWLEDGE BASE ===".to_string(),
        SourceType::DataMart => "=== BUSINESS DATA ===".to_string(),
        SourceType::RoleSpecific => format!("=== {} SPECIFIC CONTENT ===", role.to_uppercase()),
        SourceType::ConversationHistory => "=== RECENT CONVERSATION ===".to_string(),
    }
}

/// Hard character cut. Not sentence-aware; may end mid-word.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push_str("...");
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::store::Chunk;

    fn fragment(text: &str, source: SourceType) -> Fragment {
        Fragment {
            chunk: Chunk {
                text: text.to_string(),
                metadata: BTreeMap::new(),
            },
            source,
            score: 0.9,
        }
    }

    fn ctx(max_context_chars: usize) -> RetrievalContext {
        RetrievalContext {
            user_id: "frank".to_string(),
            role: "Analyst-Gaming".to_string(),
            session_id: "s1".to_string(),
            data_sources: SourceType::ALL.to_vec(),
            max_fragments: 5,
            max_context_chars,
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let fragments = vec![
            fragment("a recent chat turn", SourceType::ConversationHistory),
            fragment("a business figure", SourceType::DataMart),
            fragment("a personal note", SourceType::UserDocuments),
        ];

        let prompt = ContextComposer::new().compose("what changed?", &fragments, &ctx(500));

        let docs = prompt.find("=== USER DOCUMENTS ===").unwrap();
        let data = prompt.find("=== BUSINESS DATA ===").unwrap();
        let chat = prompt.find("=== RECENT CONVERSATION ===").unwrap();
        assert!(docs < data && data < chat);
    }

    #[test]
    fn role_section_header_carries_the_role() {
        let fragments = vec![fragment("guidance", SourceType::RoleSpecific)];
        let prompt = ContextComposer::new().compose("q", &fragments, &ctx(500));
        assert!(prompt.contains("=== ANALYST-GAMING SPECIFIC CONTENT ==="));
    }

    #[test]
    fn fragments_are_clipped_at_the_ceiling() {
        let long_text = "x".repeat(800);
        let fragments = vec![fragment(&long_text, SourceType::CommonKnowledge)];

        let prompt = ContextComposer::new().compose("q", &fragments, &ctx(100));
        assert!(prompt.contains(&format!("{}...", "x".repeat(100))));
        assert!(!prompt.contains(&"x".repeat(101)));
    }

    #[test]
    fn framing_and_query_are_present() {
        let prompt =
            ContextComposer::new().compose("Which games grew fastest?", &[], &ctx(500));

        assert!(prompt.starts_with("You are Mimir, an AI assistant for a Analyst-Gaming user."));
        assert!(prompt.contains("User Question: Which games grew fastest?"));
        assert!(prompt.contains("If you don't have enough information, say so clearly."));
    }

    #[test]
    fn empty_retrieval_adds_a_notice() {
        let prompt = ContextComposer::new().compose("q", &[], &ctx(500));
        assert!(prompt.contains("No relevant context was retrieved"));
        assert!(!prompt.contains("==="));
    }
}
