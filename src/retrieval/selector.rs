//! Source selection policy.
//!
//! Decides which knowledge partitions are in scope for a query. The
//! role rules live in a policy table (token → additional sources) so
//! new role labels work without a code change as long as they carry a
//! known token.

use crate::registry::SourceType;

/// One policy entry: roles whose label contains `token` also consult
/// `additions`.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    pub token: String,
    pub additions: Vec<SourceType>,
}

#[derive(Debug, Clone)]
pub struct SourceSelector {
    defaults: Vec<SourceType>,
    policies: Vec<RolePolicy>,
}

impl SourceSelector {
    pub fn new(defaults: Vec<SourceType>, policies: Vec<RolePolicy>) -> Self {
        Self { defaults, policies }
    }

    /// Resolve the partitions in scope for a request.
    ///
    /// An explicit source list overrides the policy: each name is
    /// validated against the known enumeration and unknown names are
    /// dropped with a warning, never a request failure. Without an
    /// explicit list, the defaults apply plus any policy additions
    /// whose token appears in the role label (case-sensitive).
    ///
    /// The returned set is normalized to declaration order.
    pub fn select(&self, role: &str, explicit: Option<&[String]>) -> Vec<SourceType> {
        if let Some(requested) = explicit {
            let mut selected = Vec::new();
            for name in requested {
                match SourceType::parse(name) {
                    Some(source) => selected.push(source),
                    None => {
                        tracing::warn!("Dropping unknown data source '{}'", name);
                    }
                }
            }
            return normalize(&selected);
        }

        let mut selected = self.defaults.clone();
        for policy in &self.policies {
            if role.contains(policy.token.as_str()) {
                selected.extend(policy.additions.iter().copied());
            }
        }

        normalize(&selected)
    }
}

impl Default for SourceSelector {
    fn default() -> Self {
        Self::new(
            vec![
                SourceType::UserDocuments,
                SourceType::CommonKnowledge,
                SourceType::ConversationHistory,
            ],
            vec![
                RolePolicy {
                    token: "Analyst".to_string(),
                    additions: vec![SourceType::DataMart, SourceType::RoleSpecific],
                },
                RolePolicy {
                    token: "Leadership".to_string(),
                    additions: vec![SourceType::DataMart, SourceType::RoleSpecific],
                },
            ],
        )
    }
}

/// Dedupe and order by `SourceType::ALL` declaration order.
fn normalize(selected: &[SourceType]) -> Vec<SourceType> {
    SourceType::ALL
        .into_iter()
        .filter(|source| selected.contains(source))
        .collect()
}
