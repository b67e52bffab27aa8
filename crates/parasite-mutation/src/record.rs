//! Mutation records
//!
//! A mutation is created exactly once per accepted or mutated proposal and is
//! immutable afterward.

use chrono::{DateTime, Utc};
use parasite_common::crypto::short_digest;
use parasite_common::next_time_ordered_id;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default artifact path recorded when the caller names none
pub const DEFAULT_ARTIFACT: &str = "main.rs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    id: Uuid,
    agent_id: String,
    proposal_id: Uuid,
    source_agent_id: String,
    original: String,
    mutated: String,
    mutation_type: String,
    description: String,
    files_affected: Vec<String>,
    created_at: DateTime<Utc>,
    /// Nominal chimera impact of the technique used (percent)
    impact: f64,
    content_hash: String,
}

impl Mutation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record(
        agent_id: &str,
        proposal_id: Uuid,
        source_agent_id: &str,
        original: String,
        mutated: String,
        mutation_type: impl Into<String>,
        description: impl Into<String>,
        impact: f64,
    ) -> Self {
        let content_hash = Self::derive_hash(&original, &mutated, &proposal_id);
        Self {
            id: next_time_ordered_id(),
            agent_id: agent_id.to_string(),
            proposal_id,
            source_agent_id: source_agent_id.to_string(),
            original,
            mutated,
            mutation_type: mutation_type.into(),
            description: description.into(),
            files_affected: vec![DEFAULT_ARTIFACT.to_string()],
            created_at: Utc::now(),
            impact,
            content_hash,
        }
    }

    fn derive_hash(original: &str, mutated: &str, proposal_id: &Uuid) -> String {
        short_digest(&format!("{original}:{mutated}:{proposal_id}"))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn proposal_id(&self) -> Uuid {
        self.proposal_id
    }

    pub fn source_agent_id(&self) -> &str {
        &self.source_agent_id
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn mutated(&self) -> &str {
        &self.mutated
    }

    pub fn mutation_type(&self) -> &str {
        &self.mutation_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn files_affected(&self) -> &[String] {
        &self.files_affected
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn impact(&self) -> f64 {
        self.impact
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Whether the artifact actually changed
    pub fn changed(&self) -> bool {
        self.original != self.mutated
    }

    /// Lines present in the mutated artifact beyond the original
    pub fn added_lines(&self) -> usize {
        self.mutated
            .lines()
            .count()
            .saturating_sub(self.original.lines().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_depends_on_content_and_proposal() {
        let proposal = Uuid::nil();
        let a = Mutation::record("agent_a", proposal, "agent_b", "x".into(), "xy".into(), "feature_addition", "", 0.0);
        let b = Mutation::record("agent_a", proposal, "agent_b", "x".into(), "xy".into(), "feature_addition", "", 0.0);
        let c = Mutation::record("agent_a", Uuid::from_u128(1), "agent_b", "x".into(), "xy".into(), "feature_addition", "", 0.0);

        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash().len(), 16);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_added_lines() {
        let m = Mutation::record("a", Uuid::nil(), "b", "l1\nl2".into(), "l1\nl2\nl3\nl4".into(), "t", "", 0.0);
        assert!(m.changed());
        assert_eq!(m.added_lines(), 2);
        assert_eq!(m.files_affected(), &["main.rs".to_string()]);
    }
}
