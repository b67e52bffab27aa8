//! Agent runtime state
//!
//! Everything one agent owns: its artifact, inbox, mutation engine (and so its
//! genealogy) and a short memory of past reasoning and proposal traffic.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parasite_mutation::{ChimeraStats, MutationEngine};
use serde::{Deserialize, Serialize};

use crate::config::AgentProfile;
use crate::inbox::{Inbox, InboxStats};

/// Entries of history kept for prompts
pub const HISTORY_WINDOW: usize = 10;

/// Reasoning entries kept per agent
pub const REASONING_LOG_CAP: usize = 50;

/// Characters of reasoning text kept per entry
const REASONING_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Reasoning,
    Coding,
    Defending,
    Infecting,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningEntry {
    pub mode: String,
    pub iteration: u64,
    pub excerpt: String,
}

#[derive(Debug)]
pub struct AgentRuntime {
    profile: AgentProfile,
    pub(crate) state: AgentState,
    pub(crate) codebase: String,
    pub(crate) iteration: u64,
    pub(crate) inbox: Inbox,
    pub(crate) mutations: MutationEngine,
    reasoning_log: VecDeque<ReasoningEntry>,
    history: VecDeque<String>,
    created_at: DateTime<Utc>,
    pub(crate) last_cycle_at: Option<DateTime<Utc>>,
}

/// Serializable snapshot of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub name: String,
    pub goal: String,
    pub state: AgentState,
    pub iteration: u64,
    pub codebase_size: usize,
    pub inbox: InboxStats,
    pub chimera: ChimeraStats,
    pub created_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl AgentRuntime {
    /// Agent starting from its profile's seed artifact
    pub fn new(profile: AgentProfile) -> Self {
        Self::with_engine(profile, MutationEngine::default())
    }

    pub fn with_engine(profile: AgentProfile, mutations: MutationEngine) -> Self {
        let codebase = profile.seed_code();
        Self {
            profile,
            state: AgentState::Idle,
            codebase,
            iteration: 0,
            inbox: Inbox::new(),
            mutations,
            reasoning_log: VecDeque::with_capacity(REASONING_LOG_CAP),
            history: VecDeque::with_capacity(HISTORY_WINDOW),
            created_at: Utc::now(),
            last_cycle_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn codebase(&self) -> &str {
        &self.codebase
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn inbox_mut(&mut self) -> &mut Inbox {
        &mut self.inbox
    }

    pub fn mutation_engine(&self) -> &MutationEngine {
        &self.mutations
    }

    /// Most recent reasoning, oldest first
    pub fn reasoning_log(&self) -> impl Iterator<Item = &ReasoningEntry> {
        self.reasoning_log.iter()
    }

    /// Deliver a proposal from another agent
    pub fn receive(&mut self, infection: parasite_common::Infection) {
        tracing::info!(
            agent_id = %self.profile.id,
            infection_id = %infection.id(),
            source = %infection.source_agent_id(),
            "Infection received"
        );
        self.remember(format!(
            "received {} from {}: {}",
            infection.kind(),
            infection.source_agent_id(),
            excerpt(&infection.payload().message, 80)
        ));
        self.inbox.receive(infection);
    }

    pub(crate) fn log_reasoning(&mut self, mode: &str, text: &str) {
        push_capped(
            &mut self.reasoning_log,
            ReasoningEntry {
                mode: mode.to_string(),
                iteration: self.iteration,
                excerpt: excerpt(text, REASONING_EXCERPT_CHARS),
            },
            REASONING_LOG_CAP,
        );
    }

    pub(crate) fn remember(&mut self, line: String) {
        push_capped(&mut self.history, line, HISTORY_WINDOW);
    }

    /// Last [`HISTORY_WINDOW`] proposal events, oldest first
    pub fn recent_history(&self) -> Vec<String> {
        self.history.iter().cloned().collect()
    }

    pub fn chimera_percentage(&self) -> f64 {
        self.mutations.chimera_percentage(&self.profile.id)
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            agent_id: self.profile.id.clone(),
            name: self.profile.name.clone(),
            goal: self.profile.goal.clone(),
            state: self.state,
            iteration: self.iteration,
            codebase_size: self.codebase.len(),
            inbox: self.inbox.stats(),
            chimera: self.mutations.stats(&self.profile.id),
            created_at: self.created_at,
            last_cycle_at: self.last_cycle_at,
        }
    }

    /// Artifact with a provenance header
    pub fn export_codebase(&self) -> String {
        let stats = self.inbox.stats();
        format!(
            "// Generated by: {} ({})\n// Goal: {}\n// Iteration: {}\n// Infections accepted: {}\n// Chimera: {:.0}%\n// Generated at: {}\n\n{}",
            self.profile.name,
            self.profile.id,
            self.profile.goal,
            self.iteration,
            stats.accepted + stats.mutated,
            self.chimera_percentage(),
            Utc::now().to_rfc3339(),
            self.codebase
        )
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    while queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(item);
}

pub(crate) fn excerpt(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_roster;
    use parasite_common::{Infection, InfectionKind, InfectionPayload};

    #[test]
    fn test_new_agent_starts_from_seed() {
        let profile = default_roster().remove(0);
        let agent = AgentRuntime::new(profile.clone());
        assert_eq!(agent.codebase(), profile.seed_code());
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.chimera_percentage(), 0.0);
        assert!(agent.export_codebase().starts_with("// Generated by: DEX Builder (agent_a)"));
    }

    #[test]
    fn test_history_window() {
        let mut agent = AgentRuntime::new(default_roster().remove(1));
        for i in 0..15 {
            agent.receive(Infection::create(
                "agent_a",
                "agent_b",
                InfectionKind::Suggestion,
                InfectionPayload::new(format!("idea {i}")),
            ));
        }
        let history = agent.recent_history();
        assert_eq!(history.len(), HISTORY_WINDOW);
        assert!(history.last().unwrap().ends_with("idea 14"));
        assert_eq!(agent.status().inbox.pending, 15);
    }

    #[test]
    fn test_memory_stays_bounded() {
        let mut agent = AgentRuntime::new(default_roster().remove(1));
        for i in 0..(REASONING_LOG_CAP * 3) {
            agent.log_reasoning("plan", &format!("thought {i}"));
            agent.remember(format!("event {i}"));
        }

        assert_eq!(agent.reasoning_log.len(), REASONING_LOG_CAP);
        assert_eq!(agent.history.len(), HISTORY_WINDOW);

        let last = REASONING_LOG_CAP * 3 - 1;
        let first_kept = REASONING_LOG_CAP * 2;
        let entries: Vec<&ReasoningEntry> = agent.reasoning_log().collect();
        assert_eq!(entries[0].excerpt, format!("thought {first_kept}"));
        assert_eq!(entries[REASONING_LOG_CAP - 1].excerpt, format!("thought {last}"));
        assert_eq!(agent.recent_history().last().unwrap(), &format!("event {last}"));
    }
}
