//! Inference request and result types
//!
//! - [`InferenceRequest`]: immutable input for one orchestrated call
//! - [`InferenceResult`]: typed outcome, produced once per successful provider call

use parasite_common::{Infection, InfectionKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ProviderFailure;

/// Which reasoning step the agent is performing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    Plan,
    GenerateCode,
    ProposeInfections,
    EvaluateInfection,
    Reflect,
}

impl InferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMode::Plan => "plan",
            InferenceMode::GenerateCode => "generate_code",
            InferenceMode::ProposeInfections => "propose_infections",
            InferenceMode::EvaluateInfection => "evaluate_infection",
            InferenceMode::Reflect => "reflect",
        }
    }
}

impl std::fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt-facing view of a pending proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDigest {
    pub id: String,
    pub source_agent_id: String,
    pub kind: InfectionKind,
    pub message: String,
    pub code_snippet: Option<String>,
    pub priority: u8,
}

impl From<&Infection> for ProposalDigest {
    fn from(infection: &Infection) -> Self {
        Self {
            id: infection.id().to_string(),
            source_agent_id: infection.source_agent_id().to_string(),
            kind: infection.kind(),
            message: infection.payload().message.clone(),
            code_snippet: infection.payload().code_snippet.clone(),
            priority: infection.payload().priority,
        }
    }
}

/// Input for one orchestrated inference call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub mode: InferenceMode,
    pub agent_id: String,
    pub agent_goal: String,
    /// Trailing window of the agent's artifact
    pub code_context: String,
    pub pending_proposals: Vec<ProposalDigest>,
    /// One line per past infection event, newest last
    pub history: Vec<String>,
    /// Ids of other agents the caller may target
    pub known_agents: Vec<String>,
    pub iteration: u64,
    pub provider_override: Option<String>,
    pub model_override: Option<String>,
}

impl InferenceRequest {
    pub fn new(mode: InferenceMode, agent_id: impl Into<String>, agent_goal: impl Into<String>) -> Self {
        Self {
            mode,
            agent_id: agent_id.into(),
            agent_goal: agent_goal.into(),
            code_context: String::new(),
            pending_proposals: Vec::new(),
            history: Vec::new(),
            known_agents: Vec::new(),
            iteration: 0,
            provider_override: None,
            model_override: None,
        }
    }

    /// Keep only the last `max_chars` characters of `code`
    pub fn with_code_context(mut self, code: &str, max_chars: usize) -> Self {
        self.code_context = tail_chars(code, max_chars).to_string();
        self
    }

    pub fn with_pending(mut self, pending: Vec<ProposalDigest>) -> Self {
        self.pending_proposals = pending;
        self
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    pub fn with_known_agents(mut self, agents: Vec<String>) -> Self {
        self.known_agents = agents;
        self
    }

    pub fn with_iteration(mut self, iteration: u64) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider_override = provider;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }
}

fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// A proposal the model wants to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedInfection {
    pub target_id: String,
    pub kind: InfectionKind,
    pub message: String,
    pub code_snippet: Option<String>,
    pub priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Accept,
    Reject,
    Mutate,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Accept => "accept",
            DecisionKind::Reject => "reject",
            DecisionKind::Mutate => "mutate",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The target's verdict on one proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub reason: String,
    /// Free-form hints when mutating (`technique`, `quality`, `trust`, ...)
    pub mutation_hints: Option<serde_json::Value>,
}

impl Decision {
    pub fn new(kind: DecisionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            mutation_hints: None,
        }
    }

    pub fn with_hints(mut self, hints: serde_json::Value) -> Self {
        self.mutation_hints = Some(hints);
        self
    }
}

/// Outcome of one orchestrated call
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub mode: InferenceMode,
    pub raw_text: String,
    pub code_output: Option<String>,
    pub proposals: Vec<ProposedInfection>,
    /// Explicit per-proposal decisions keyed by proposal id
    pub decisions: HashMap<String, Decision>,
    /// Whole-response verdict from plain-text inference
    pub fallback_decision: Option<Decision>,
    /// Provider that produced `raw_text`
    pub provider: Option<String>,
    /// Providers that failed before this one succeeded
    pub failures: Vec<ProviderFailure>,
}

impl InferenceResult {
    /// Result carrying only the raw text
    pub fn narrative_only(mode: InferenceMode, raw_text: impl Into<String>) -> Self {
        Self {
            mode,
            raw_text: raw_text.into(),
            code_output: None,
            proposals: Vec::new(),
            decisions: HashMap::new(),
            fallback_decision: None,
            provider: None,
            failures: Vec::new(),
        }
    }

    /// Decision for a pending proposal
    ///
    /// `ordinal` is the 1-based position the proposal had in the prompt. Lookup
    /// order: the id, `infection_<ordinal>`, `<ordinal>`, the fallback decision,
    /// then a default reject.
    pub fn decision_for(&self, proposal_id: &str, ordinal: usize) -> Decision {
        self.decisions
            .get(proposal_id)
            .or_else(|| self.decisions.get(&format!("infection_{ordinal}")))
            .or_else(|| self.decisions.get(&ordinal.to_string()))
            .or(self.fallback_decision.as_ref())
            .cloned()
            .unwrap_or_else(|| Decision::new(DecisionKind::Reject, "No explicit decision made"))
    }

    pub fn narrative(&self) -> &str {
        &self.raw_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_context_keeps_tail() {
        let request = InferenceRequest::new(InferenceMode::Plan, "agent_a", "DEX")
            .with_code_context("héllo world", 5);
        assert_eq!(request.code_context, "world");

        let short = InferenceRequest::new(InferenceMode::Plan, "agent_a", "DEX")
            .with_code_context("fn main() {}", 100);
        assert_eq!(short.code_context, "fn main() {}");
    }

    #[test]
    fn test_decision_fallbacks() {
        let mut result = InferenceResult::narrative_only(InferenceMode::EvaluateInfection, "");
        assert_eq!(result.decision_for("x", 1).kind, DecisionKind::Reject);
        assert_eq!(result.decision_for("x", 1).reason, "No explicit decision made");

        result.fallback_decision = Some(Decision::new(DecisionKind::Accept, "looks good"));
        assert_eq!(result.decision_for("x", 1).kind, DecisionKind::Accept);

        result
            .decisions
            .insert("x".into(), Decision::new(DecisionKind::Mutate, "partly"));
        result
            .decisions
            .insert("infection_2".into(), Decision::new(DecisionKind::Reject, "no"));
        assert_eq!(result.decision_for("x", 1).kind, DecisionKind::Mutate);
        assert_eq!(result.decision_for("y", 2).kind, DecisionKind::Reject);
        assert_eq!(result.decision_for("z", 3).kind, DecisionKind::Accept);
    }
}
