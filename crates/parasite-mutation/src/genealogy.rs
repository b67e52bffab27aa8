//! Per-agent mutation history
//!
//! Append-only: mutations are never removed and contributors are only added.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::Mutation;
use crate::{CHIMERA_CAP, CHIMERA_STEP};

#[derive(Debug, Clone, Default)]
pub struct Genealogy {
    agent_id: String,
    mutations: Vec<Mutation>,
    /// Contributing agents in first-contribution order
    contributors: Vec<String>,
}

impl Genealogy {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            mutations: Vec::new(),
            contributors: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, mutation: Mutation) {
        let source = mutation.source_agent_id();
        if !self.contributors.iter().any(|c| c == source) {
            self.contributors.push(source.to_string());
        }
        self.mutations.push(mutation);
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn contributors(&self) -> &[String] {
        &self.contributors
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn chimera_percentage(&self) -> f64 {
        chimera_for(self.mutations.len())
    }

    /// Timeline of mutations, oldest first
    pub fn lineage(&self) -> Vec<LineageEntry> {
        self.mutations
            .iter()
            .map(|m| LineageEntry {
                mutation_id: m.id(),
                proposal_id: m.proposal_id(),
                source_agent_id: m.source_agent_id().to_string(),
                mutation_type: m.mutation_type().to_string(),
                timestamp: m.created_at().to_rfc3339(),
            })
            .collect()
    }

    pub fn stats(&self) -> ChimeraStats {
        ChimeraStats {
            agent_id: self.agent_id.clone(),
            is_chimera: !self.contributors.is_empty(),
            chimera_percentage: self.chimera_percentage(),
            contributors: self.contributors.clone(),
            mutation_count: self.mutations.len(),
            total_impact: self.mutations.iter().map(Mutation::impact).sum(),
            lineage: self.lineage(),
        }
    }
}

/// `min(100, 10 × count)`
pub fn chimera_for(mutation_count: usize) -> f64 {
    (mutation_count as f64 * CHIMERA_STEP).min(CHIMERA_CAP)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub mutation_id: Uuid,
    pub proposal_id: Uuid,
    pub source_agent_id: String,
    pub mutation_type: String,
    pub timestamp: String,
}

/// Composition summary for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChimeraStats {
    pub agent_id: String,
    pub is_chimera: bool,
    pub chimera_percentage: f64,
    pub contributors: Vec<String>,
    pub mutation_count: usize,
    /// Sum of nominal technique impacts; informational only
    pub total_impact: f64,
    pub lineage: Vec<LineageEntry>,
}

impl ChimeraStats {
    /// Stats for an agent with no genealogy yet
    pub fn empty(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            is_chimera: false,
            chimera_percentage: 0.0,
            contributors: Vec::new(),
            mutation_count: 0,
            total_impact: 0.0,
            lineage: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chimera_curve() {
        assert_eq!(chimera_for(0), 0.0);
        assert_eq!(chimera_for(5), 50.0);
        assert_eq!(chimera_for(10), 100.0);
        assert_eq!(chimera_for(11), 100.0);
    }

    #[test]
    fn test_contributors_are_deduplicated_in_order() {
        let mut genealogy = Genealogy::new("agent_a");
        for source in ["agent_c", "agent_b", "agent_c"] {
            genealogy.append(Mutation::record(
                "agent_a",
                Uuid::nil(),
                source,
                String::new(),
                "x".into(),
                "feature_addition",
                "",
                0.0,
            ));
        }
        assert_eq!(genealogy.contributors(), &["agent_c".to_string(), "agent_b".to_string()]);
        assert_eq!(genealogy.len(), 3);
        assert_eq!(genealogy.lineage().len(), 3);
        assert!(genealogy.stats().is_chimera);
    }

    proptest! {
        #[test]
        fn prop_chimera_monotonic_and_capped(a in 0usize..500, b in 0usize..500) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(chimera_for(lo) <= chimera_for(hi));
            prop_assert!(chimera_for(hi) <= CHIMERA_CAP);
        }
    }
}
