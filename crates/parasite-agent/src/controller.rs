//! Agent Cycle Controller
//!
//! One cycle for one agent, strictly in order:
//!
//! ```text
//! expire stale ─► plan ─► code ─► defense (if pending) ─► infection (aggressiveness gate)
//!                                    │
//!                   accept / mutate ─┴─► MutationEngine ─► artifact
//! ```
//!
//! Every outcome is handed to the sink dispatcher. Collaborator failures are
//! logged by its worker and never reach the cycle.

use std::sync::Arc;

use chrono::Utc;
use parasite_common::{Infection, InfectionPayload, TransitionError};
use parasite_mutation::Mutation;
use parasite_reasoning::{
    Decision, DecisionKind, InferenceMode, InferenceOrchestrator, InferenceRequest, ProposalDigest,
    ReasoningConfig,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::agent::{excerpt, AgentRuntime, AgentState};
use crate::config::SwarmConfig;
use crate::error::CycleError;
use crate::sinks::{SinkEvent, SinkHandle};

/// Message used when a proposal arrives without one
pub const DEFAULT_PROPOSAL_MESSAGE: &str = "Consider this suggestion";

/// Knobs the controller needs from the wider configuration
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub code_context_chars: usize,
    pub max_infections_per_cycle: usize,
    pub proposal_ttl: chrono::Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            code_context_chars: 6000,
            max_infections_per_cycle: 3,
            proposal_ttl: chrono::Duration::hours(1),
        }
    }
}

impl CycleSettings {
    pub fn from_configs(reasoning: &ReasoningConfig, swarm: &SwarmConfig) -> Self {
        Self {
            code_context_chars: reasoning.code_context_chars,
            max_infections_per_cycle: swarm.max_infections_per_cycle,
            proposal_ttl: swarm.proposal_ttl(),
        }
    }
}

/// Verdict applied to one pending proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub infection_id: Uuid,
    pub source_agent_id: String,
    pub decision: DecisionKind,
    pub reason: String,
    pub mutation_id: Option<Uuid>,
}

/// What one cycle did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub agent_id: String,
    /// Iteration the cycle ran as
    pub iteration: u64,
    pub plan_summary: String,
    /// Characters of generated code appended
    pub code_chars: usize,
    pub expired: Vec<Uuid>,
    pub decisions: Vec<DecisionRecord>,
    pub infection_skipped: bool,
    /// Proposals created this cycle; the caller delivers them
    pub outgoing: Vec<Infection>,
    pub chimera_percentage: f64,
    pub committed_path: Option<String>,
}

impl CycleReport {
    fn new(agent_id: &str, iteration: u64) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            iteration,
            plan_summary: String::new(),
            code_chars: 0,
            expired: Vec::new(),
            decisions: Vec::new(),
            infection_skipped: false,
            outgoing: Vec::new(),
            chimera_percentage: 0.0,
            committed_path: None,
        }
    }
}

pub struct CycleController {
    orchestrator: Arc<InferenceOrchestrator>,
    sinks: SinkHandle,
    settings: CycleSettings,
}

impl CycleController {
    pub fn new(orchestrator: Arc<InferenceOrchestrator>, sinks: SinkHandle) -> Self {
        Self {
            orchestrator,
            sinks,
            settings: CycleSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Run one full cycle for `agent`
    ///
    /// `roster` lists every agent id in the swarm, used to resolve proposal
    /// targets. On error the agent is left in [`AgentState::Error`] with its
    /// iteration unchanged; pending proposals stay pending.
    #[instrument(skip(self, agent, roster), fields(agent_id = %agent.id(), iteration = agent.iteration()))]
    pub async fn run_cycle(&self, agent: &mut AgentRuntime, roster: &[String]) -> Result<CycleReport, CycleError> {
        match self.cycle(agent, roster).await {
            Ok(report) => Ok(report),
            Err(err) => {
                agent.state = AgentState::Error;
                error!(agent_id = %agent.id(), error = %err, "Cycle failed");
                Err(err)
            }
        }
    }

    async fn cycle(&self, agent: &mut AgentRuntime, roster: &[String]) -> Result<CycleReport, CycleError> {
        let agent_id = agent.id().to_string();
        let mut report = CycleReport::new(&agent_id, agent.iteration);
        let starting_artifact = agent.codebase.clone();

        self.expire_stale(agent, &mut report);
        self.plan(agent, &mut report).await?;
        self.code(agent, &mut report).await?;
        if agent.inbox.has_pending() {
            self.defend(agent, &mut report).await?;
        }
        self.infect(agent, roster, &mut report).await?;

        agent.iteration += 1;
        agent.last_cycle_at = Some(Utc::now());
        agent.state = AgentState::Idle;

        if agent.codebase != starting_artifact {
            let path = format!("agents/{}/main_v{}.rs", agent_id, agent.iteration);
            self.emit(SinkEvent::Commit {
                agent_id: agent_id.clone(),
                path: path.clone(),
                content: agent.export_codebase(),
                message: format!(
                    "[{}] iteration {}: {} decisions, chimera {:.0}%",
                    agent_id,
                    agent.iteration,
                    report.decisions.len(),
                    agent.chimera_percentage()
                ),
            });
            report.committed_path = Some(path);
        }
        report.chimera_percentage = agent.chimera_percentage();

        info!(
            agent_id = %agent_id,
            iteration = report.iteration,
            decisions = report.decisions.len(),
            sent = report.outgoing.len(),
            chimera = report.chimera_percentage,
            "Cycle complete"
        );
        Ok(report)
    }

    fn request(&self, agent: &AgentRuntime, mode: InferenceMode) -> InferenceRequest {
        let profile = agent.profile();
        InferenceRequest::new(mode, &profile.id, &profile.goal)
            .with_iteration(agent.iteration)
            .with_provider(profile.preferred_provider.clone())
            .with_model(profile.model.clone())
    }

    fn expire_stale(&self, agent: &mut AgentRuntime, report: &mut CycleReport) {
        let expired = agent.inbox.expire_older_than(self.settings.proposal_ttl, Utc::now());
        for infection in expired {
            debug!(infection_id = %infection.id(), "Proposal expired");
            self.emit(SinkEvent::Infection {
                attacker_id: infection.source_agent_id().to_string(),
                target_id: infection.target_agent_id().to_string(),
                suggestion: infection.payload().message.clone(),
                accepted: false,
                reason: "expired".to_string(),
            });
            agent.remember(format!("expired proposal from {}", infection.source_agent_id()));
            report.expired.push(infection.id());
        }
    }

    async fn plan(&self, agent: &mut AgentRuntime, report: &mut CycleReport) -> Result<(), CycleError> {
        agent.state = AgentState::Reasoning;
        let request = self
            .request(agent, InferenceMode::Plan)
            .with_code_context(&agent.codebase, self.settings.code_context_chars);
        let result = self.orchestrator.reason(&request).await?;

        agent.log_reasoning("planning", result.narrative());
        self.emit(SinkEvent::Reasoning {
            agent_id: agent.id().to_string(),
            text: result.narrative().to_string(),
            decision: None,
            context: json!({
                "mode": InferenceMode::Plan.as_str(),
                "iteration": agent.iteration,
                "provider": result.provider.as_deref(),
            }),
        });
        report.plan_summary = excerpt(result.narrative(), 200);
        Ok(())
    }

    async fn code(&self, agent: &mut AgentRuntime, report: &mut CycleReport) -> Result<(), CycleError> {
        agent.state = AgentState::Coding;
        let request = self
            .request(agent, InferenceMode::GenerateCode)
            .with_code_context(&agent.codebase, self.settings.code_context_chars);
        let result = self.orchestrator.reason(&request).await?;

        agent.log_reasoning("coding", result.narrative());
        if let Some(code) = result.code_output.filter(|c| !c.trim().is_empty()) {
            // a failed cycle keeps its output and reruns the same iteration
            let header = format!("// Iteration {}\n", agent.iteration);
            let rerun = agent.codebase.contains(&header);
            agent.codebase.push_str("\n\n");
            if !rerun {
                agent.codebase.push_str(&header);
            }
            agent.codebase.push_str(&code);
            report.code_chars = code.len();
        }
        Ok(())
    }

    async fn defend(&self, agent: &mut AgentRuntime, report: &mut CycleReport) -> Result<(), CycleError> {
        agent.state = AgentState::Defending;
        let pending = agent.inbox.take_pending();
        let digests: Vec<ProposalDigest> = pending.iter().map(ProposalDigest::from).collect();
        let request = self.request(agent, InferenceMode::EvaluateInfection).with_pending(digests);

        let result = match self.orchestrator.reason(&request).await {
            Ok(result) => result,
            Err(err) => {
                for infection in pending {
                    agent.inbox.resolve(infection);
                }
                return Err(err.into());
            }
        };

        agent.log_reasoning("defense", result.narrative());
        self.emit(SinkEvent::Reasoning {
            agent_id: agent.id().to_string(),
            text: result.narrative().to_string(),
            decision: Some(format!("{} proposals evaluated", pending.len())),
            context: json!({
                "mode": InferenceMode::EvaluateInfection.as_str(),
                "iteration": agent.iteration,
                "provider": result.provider.as_deref(),
            }),
        });

        let mut violation: Option<TransitionError> = None;
        for (idx, mut infection) in pending.into_iter().enumerate() {
            if violation.is_some() {
                agent.inbox.resolve(infection);
                continue;
            }
            let decision = result.decision_for(&infection.id().to_string(), idx + 1);
            match self.apply_decision(agent, &mut infection, &decision) {
                Ok(mutation) => self.report_decision(agent, &infection, &decision, mutation, report),
                Err(err) => {
                    error!(infection_id = %infection.id(), error = %err, "Proposal already resolved");
                    violation = Some(err);
                }
            }
            agent.inbox.resolve(infection);
        }

        match violation {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Move the proposal to its terminal state, then mutate the artifact
    fn apply_decision(
        &self,
        agent: &mut AgentRuntime,
        infection: &mut Infection,
        decision: &Decision,
    ) -> Result<Option<Mutation>, TransitionError> {
        let agent_id = agent.id().to_string();
        let mutation = match decision.kind {
            DecisionKind::Accept => {
                infection.accept(decision.reason.as_str())?;
                agent.mutations.apply_mutation(&agent_id, &agent.codebase, infection)
            }
            DecisionKind::Mutate => {
                let details = decision.mutation_hints.clone().unwrap_or_else(|| json!({}));
                infection.mutate(details, decision.reason.as_str())?;
                agent
                    .mutations
                    .apply_hinted(&agent_id, &agent.codebase, infection, decision.mutation_hints.as_ref())
            }
            DecisionKind::Reject => {
                infection.reject(decision.reason.as_str())?;
                return Ok(None);
            }
        };
        agent.codebase = mutation.mutated().to_string();
        Ok(Some(mutation))
    }

    fn report_decision(
        &self,
        agent: &mut AgentRuntime,
        infection: &Infection,
        decision: &Decision,
        mutation: Option<Mutation>,
        report: &mut CycleReport,
    ) {
        info!(
            agent_id = %agent.id(),
            infection_id = %infection.id(),
            source = %infection.source_agent_id(),
            decision = %decision.kind,
            "Proposal resolved"
        );

        self.emit(SinkEvent::Infection {
            attacker_id: infection.source_agent_id().to_string(),
            target_id: agent.id().to_string(),
            suggestion: infection.payload().message.clone(),
            accepted: decision.kind != DecisionKind::Reject,
            reason: decision.reason.clone(),
        });
        self.emit(SinkEvent::Proof {
            subject_hash: infection.content_hash().to_string(),
        });

        let mutation_id = mutation.map(|mutation| {
            let id = mutation.id();
            self.emit(SinkEvent::Proof {
                subject_hash: mutation.content_hash().to_string(),
            });
            self.emit(SinkEvent::Mutation(Box::new(mutation)));
            id
        });

        agent.remember(format!(
            "{} {} from {}: {}",
            decision.kind,
            infection.kind(),
            infection.source_agent_id(),
            excerpt(&decision.reason, 80)
        ));
        report.decisions.push(DecisionRecord {
            infection_id: infection.id(),
            source_agent_id: infection.source_agent_id().to_string(),
            decision: decision.kind,
            reason: decision.reason.clone(),
            mutation_id,
        });
    }

    async fn infect(&self, agent: &mut AgentRuntime, roster: &[String], report: &mut CycleReport) -> Result<(), CycleError> {
        agent.state = AgentState::Infecting;

        let roll: f64 = rand::thread_rng().gen();
        if roll > agent.profile().aggressiveness {
            debug!(agent_id = %agent.id(), roll, "Not aggressive enough this cycle");
            report.infection_skipped = true;
            return Ok(());
        }

        let agent_id = agent.id().to_string();
        let others: Vec<String> = roster.iter().filter(|id| **id != agent_id).cloned().collect();
        let request = self
            .request(agent, InferenceMode::ProposeInfections)
            .with_history(agent.recent_history())
            .with_known_agents(others.clone());
        let result = self.orchestrator.reason(&request).await?;
        agent.log_reasoning("infection", result.narrative());

        for proposal in result.proposals.into_iter().take(self.settings.max_infections_per_cycle) {
            let Some(target) = resolve_target(&proposal.target_id, &others) else {
                warn!(agent_id = %agent_id, target = %proposal.target_id, "No agent to deliver to");
                continue;
            };

            let message = if proposal.message.trim().is_empty() {
                DEFAULT_PROPOSAL_MESSAGE.to_string()
            } else {
                proposal.message
            };
            let mut payload = InfectionPayload::new(message).with_priority(i64::from(proposal.priority));
            if let Some(code) = proposal.code_snippet {
                payload = payload.with_code(code);
            }

            let infection = Infection::create(&agent_id, target.as_str(), proposal.kind, payload);
            self.emit(SinkEvent::Proof {
                subject_hash: infection.content_hash().to_string(),
            });
            agent.inbox.record_sent(infection.id());
            agent.remember(format!(
                "sent {} to {}: {}",
                infection.kind(),
                target,
                excerpt(&infection.payload().message, 80)
            ));
            info!(
                source = %agent_id,
                target = %target,
                infection_id = %infection.id(),
                "Infection sent"
            );
            report.outgoing.push(infection);
        }
        Ok(())
    }

    fn emit(&self, event: SinkEvent) {
        self.sinks.emit(event);
    }
}

/// The named target if it is another known agent, otherwise a random one
fn resolve_target(requested: &str, others: &[String]) -> Option<String> {
    let requested = requested.trim();
    if let Some(found) = others.iter().find(|id| id.as_str() == requested) {
        return Some(found.clone());
    }
    others.choose(&mut rand::thread_rng()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentProfile;
    use crate::sinks::{RecordingSinks, SinkDispatcher, Sinks};
    use parasite_common::{InfectionKind, InfectionState};
    use parasite_reasoning::{InferenceProvider, RateLimiter, ScriptedProvider, ScriptedReply};
    use std::time::Duration;

    const PLAN: &str = "Next: add a price oracle.";
    const CODE: &str = "Here:\n```rust\nfn oracle() -> u64 {\n    42\n}\n```";

    fn orchestrator(provider: ScriptedProvider) -> Arc<InferenceOrchestrator> {
        let providers: Vec<Arc<dyn InferenceProvider>> = vec![Arc::new(provider)];
        Arc::new(
            InferenceOrchestrator::new(providers, Arc::new(RateLimiter::new(100, Duration::from_secs(60))))
                .with_retry(parasite_reasoning::RetryPolicy::once()),
        )
    }

    fn scripted(defense: &str, proposals: &str) -> ScriptedProvider {
        ScriptedProvider::answering("scripted", PLAN)
            .with_rule("MODE: CODING", ScriptedReply::text(CODE))
            .with_rule("MODE: DEFENSE", ScriptedReply::text(defense))
            .with_rule("MODE: INFECTION CREATION", ScriptedReply::text(proposals))
    }

    fn agent(aggressiveness: f64) -> AgentRuntime {
        AgentRuntime::new(AgentProfile::new("agent_a", "DEX Builder", "Build a DEX").with_aggressiveness(aggressiveness))
    }

    fn roster() -> Vec<String> {
        vec!["agent_a".to_string(), "agent_b".to_string()]
    }

    fn incoming(code: Option<&str>) -> Infection {
        let mut payload = InfectionPayload::new("Use my oracle");
        if let Some(code) = code {
            payload = payload.with_code(code);
        }
        Infection::create("agent_b", "agent_a", InfectionKind::Suggestion, payload)
    }

    #[tokio::test]
    async fn test_plan_and_code_phases() {
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(scripted("REJECT", "[]")), handle);
        let mut agent = agent(0.0);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();

        assert_eq!(report.iteration, 0);
        assert_eq!(report.plan_summary, PLAN);
        assert!(agent.codebase().contains("// Iteration 0\nfn oracle() -> u64 {"));
        assert_eq!(agent.iteration(), 1);
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(report.committed_path.as_deref(), Some("agents/agent_a/main_v1.rs"));

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_accept_mutates_artifact() {
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(scripted("I ACCEPT this oracle", "[]")), handle);
        let mut agent = agent(0.0);
        agent.receive(incoming(Some("fn their_oracle() -> u64 { 7 }")));

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();

        assert_eq!(report.decisions.len(), 1);
        assert_eq!(report.decisions[0].decision, DecisionKind::Accept);
        assert!(report.decisions[0].mutation_id.is_some());
        assert!(agent.codebase().contains("// INFECTION FROM: agent_b"));
        assert!(agent.codebase().ends_with("fn their_oracle() -> u64 { 7 }"));
        assert_eq!(agent.inbox().history()[0].state(), InfectionState::Accepted);
        assert_eq!(agent.chimera_percentage(), 10.0);

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_structured_decisions_by_id() {
        let first = incoming(None);
        let second = incoming(Some("fn x() {}"));
        let defense = format!(
            r#"{{"{}": {{"decision": "reject", "reason": "off-goal"}}, "{}": {{"decision": "mutate", "reason": "idea only", "mutations": {{"technique": "conceptual_extraction"}}}}}}"#,
            first.id(),
            second.id()
        );

        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(scripted(&defense, "[]")), handle);
        let mut agent = agent(0.0);
        agent.receive(first);
        agent.receive(second);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();

        let kinds: Vec<DecisionKind> = report.decisions.iter().map(|d| d.decision).collect();
        assert_eq!(kinds, vec![DecisionKind::Reject, DecisionKind::Mutate]);
        assert_eq!(report.decisions[0].reason, "off-goal");
        let mutated = &agent.inbox().history()[1];
        assert_eq!(mutated.state(), InfectionState::Mutated);
        assert_eq!(mutated.mutation_details().unwrap()["technique"], "conceptual_extraction");
        assert!(agent.codebase().contains("Mutation Technique: CONCEPTUAL_EXTRACTION"));

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_unrecognizable_verdict_rejects() {
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(scripted("hmm.", "[]")), handle);
        let mut agent = agent(0.0);
        agent.receive(incoming(None));
        let before = agent.codebase().to_string();

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();

        assert_eq!(report.decisions[0].decision, DecisionKind::Reject);
        assert!(agent.codebase().starts_with(&before));
        assert!(!agent.codebase().contains("INFLUENCED BY"));

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_proposals_redirect_unknown_targets() {
        let proposals = r#"[{"target_agent_id": "agent_zz", "message": "", "priority": 14},
                            {"target_agent_id": "agent_b", "message": "Adopt my AMM", "code_snippet": "fn amm() {}"}]"#;
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(scripted("REJECT", proposals)), handle);
        let mut agent = agent(1.0);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();

        assert!(!report.infection_skipped);
        assert_eq!(report.outgoing.len(), 2);
        assert!(report.outgoing.iter().all(|i| i.target_agent_id() == "agent_b"));
        assert_eq!(report.outgoing[0].payload().message, DEFAULT_PROPOSAL_MESSAGE);
        assert_eq!(report.outgoing[0].payload().priority, 10);
        assert_eq!(report.outgoing[1].payload().code_snippet.as_deref(), Some("fn amm() {}"));
        assert_eq!(agent.inbox().sent().len(), 2);

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_proposals_capped_per_cycle() {
        let proposals = r#"[{"target": "agent_b", "message": "1"}, {"target": "agent_b", "message": "2"},
                            {"target": "agent_b", "message": "3"}, {"target": "agent_b", "message": "4"}]"#;
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(scripted("REJECT", proposals)), handle).with_settings(
            CycleSettings {
                max_infections_per_cycle: 2,
                ..CycleSettings::default()
            },
        );
        let mut agent = agent(1.0);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();
        assert_eq!(report.outgoing.len(), 2);

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_zero_aggressiveness_skips_proposals() {
        let provider = scripted("REJECT", r#"[{"target": "agent_b", "message": "x"}]"#);
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(provider), handle);
        let mut agent = agent(0.0);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();
        assert!(report.infection_skipped);
        assert!(report.outgoing.is_empty());

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_exhausted_providers_fail_cycle_and_keep_pending() {
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(
            orchestrator(
                ScriptedProvider::answering("scripted", PLAN)
                    .with_rule("MODE: DEFENSE", ScriptedReply::Fail("boom".into())),
            ),
            handle,
        );
        let mut agent = agent(0.0);
        agent.receive(incoming(None));

        let err = controller.run_cycle(&mut agent, &roster()).await.unwrap_err();

        assert!(matches!(err, CycleError::Reasoning(_)));
        assert_eq!(agent.state(), AgentState::Error);
        assert_eq!(agent.iteration(), 0);
        assert_eq!(agent.inbox().pending().len(), 1);

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_sink_failures_do_not_abort_cycle() {
        let recorder = Arc::new(RecordingSinks::failing());
        let (handle, worker) = SinkDispatcher::spawn(Sinks::recording(recorder.clone()), 64);
        let controller = CycleController::new(orchestrator(scripted("ACCEPT", "[]")), handle);
        let mut agent = agent(0.0);
        agent.receive(incoming(Some("fn y() {}")));

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();
        assert_eq!(report.decisions.len(), 1);

        drop(controller);
        let stats = worker.finish().await;
        assert!(stats.failed > 0);
        assert_eq!(stats.delivered, 0);
        assert!(recorder.proofs().is_empty());
    }

    #[tokio::test]
    async fn test_stale_proposals_expire_before_defense() {
        let provider = scripted("ACCEPT", "[]");
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(provider), handle).with_settings(CycleSettings {
            proposal_ttl: chrono::Duration::milliseconds(-1),
            ..CycleSettings::default()
        });
        let mut agent = agent(0.0);
        let stale = incoming(None);
        let stale_id = stale.id();
        agent.receive(stale);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();

        assert_eq!(report.expired, vec![stale_id]);
        assert!(report.decisions.is_empty());
        assert_eq!(agent.inbox().history()[0].state(), InfectionState::Expired);

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_rerun_after_failed_defense_keeps_one_iteration_header() {
        let provider = scripted("REJECT", "[]");
        provider.push(ScriptedReply::text(PLAN));
        provider.push(ScriptedReply::text(CODE));
        provider.push(ScriptedReply::Fail("boom".into()));
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(provider), handle);
        let mut agent = agent(0.0);
        agent.receive(incoming(None));

        assert!(controller.run_cycle(&mut agent, &roster()).await.is_err());
        assert_eq!(agent.iteration(), 0);
        assert_eq!(agent.codebase().matches("// Iteration 0\n").count(), 1);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();
        assert_eq!(report.decisions[0].decision, DecisionKind::Reject);
        assert_eq!(agent.codebase().matches("// Iteration 0\n").count(), 1);
        assert_eq!(agent.codebase().matches("fn oracle() -> u64 {").count(), 2);
        assert_eq!(report.committed_path.as_deref(), Some("agents/agent_a/main_v1.rs"));

        drop(controller);
        worker.finish().await;
    }

    #[tokio::test]
    async fn test_merge_hint_folds_proposal_into_artifact() {
        let proposal = incoming(Some("use std::fmt;\n\npub fn their_oracle() -> u64 {\n    7\n}\n"));
        let defense = format!(
            r#"{{"{}": {{"decision": "mutate", "reason": "only the function", "mutations": {{"merge": "extract"}}}}}}"#,
            proposal.id()
        );
        let (handle, worker) = SinkDispatcher::spawn(Sinks::tracing(), 64);
        let controller = CycleController::new(orchestrator(scripted(&defense, "[]")), handle);
        let mut agent = agent(0.0);
        agent.receive(proposal);

        let report = controller.run_cycle(&mut agent, &roster()).await.unwrap();

        assert_eq!(report.decisions[0].decision, DecisionKind::Mutate);
        assert!(report.decisions[0].mutation_id.is_some());
        assert!(agent.codebase().contains("// Extracted from agent_b\npub fn their_oracle() -> u64 {"));
        assert!(!agent.codebase().contains("use std::fmt"));
        assert_eq!(agent.inbox().history()[0].state(), InfectionState::Mutated);
        assert_eq!(agent.chimera_percentage(), 10.0);

        drop(controller);
        worker.finish().await;
    }
}
