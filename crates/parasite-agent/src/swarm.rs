//! Swarm runner
//!
//! ```text
//!            ┌──────────── postbox (agent id ─► proposals) ◄───────────┐
//!            │ drain                                          deliver  │
//!            ▼                                                         │
//!   agent task ─► CycleController::run_cycle ─► CycleReport.outgoing ──┘
//!            │
//!            └─ sleep(cycle interval) or stop signal
//! ```
//!
//! Each agent owns its runtime on its own task, so agents never touch each
//! other's state. Proposals travel only through the postbox and are picked
//! up at the start of the target's next cycle.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parasite_common::Infection;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::agent::AgentRuntime;
use crate::config::SwarmConfig;
use crate::controller::{CycleController, CycleReport};
use crate::error::CycleError;

/// Proposals waiting for their target's next cycle
#[derive(Debug, Default)]
pub struct Postbox {
    slots: DashMap<String, Vec<Infection>>,
}

impl Postbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, infection: Infection) {
        self.slots
            .entry(infection.target_agent_id().to_string())
            .or_default()
            .push(infection);
    }

    /// Take everything addressed to `agent_id`
    pub fn drain(&self, agent_id: &str) -> Vec<Infection> {
        self.slots
            .get_mut(agent_id)
            .map(|mut slot| std::mem::take(slot.value_mut()))
            .unwrap_or_default()
    }

    pub fn waiting_for(&self, agent_id: &str) -> usize {
        self.slots.get(agent_id).map_or(0, |slot| slot.len())
    }
}

/// Stops a running swarm after the cycles in flight finish
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub struct Swarm {
    config: SwarmConfig,
    controller: Arc<CycleController>,
    agents: Vec<AgentRuntime>,
    postbox: Arc<Postbox>,
    stop: StopHandle,
}

impl Swarm {
    /// One runtime per configured agent profile
    pub fn new(config: SwarmConfig, controller: Arc<CycleController>) -> Self {
        let agents = config.agents.iter().cloned().map(AgentRuntime::new).collect();
        Self::with_agents(config, controller, agents)
    }

    pub fn with_agents(config: SwarmConfig, controller: Arc<CycleController>, agents: Vec<AgentRuntime>) -> Self {
        Self {
            config,
            controller,
            agents,
            postbox: Arc::new(Postbox::new()),
            stop: StopHandle::new(),
        }
    }

    pub fn roster(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.id().to_string()).collect()
    }

    pub fn agents(&self) -> &[AgentRuntime] {
        &self.agents
    }

    pub fn postbox(&self) -> &Postbox {
        &self.postbox
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run one cycle per agent, in roster order, on the caller's task
    ///
    /// Proposals sent by an earlier agent reach a later one in the same round.
    pub async fn step(&mut self) -> Vec<Result<CycleReport, CycleError>> {
        let roster = self.roster();
        let mut results = Vec::with_capacity(self.agents.len());
        for agent in self.agents.iter_mut() {
            let result = run_one(&self.controller, &self.postbox, agent, &roster).await;
            results.push(result);
        }
        results
    }

    /// Run every agent concurrently until stopped or out of cycles
    ///
    /// Returns the agents once all of their tasks have ended.
    pub async fn run(self) -> Vec<AgentRuntime> {
        let roster = self.roster();
        let interval = self.config.cycle_interval();
        let max_cycles = self.config.max_cycles;

        info!(
            agents = roster.len(),
            interval_secs = interval.as_secs(),
            max_cycles = ?max_cycles,
            "Swarm started"
        );

        let tasks = self.agents.into_iter().map(|mut agent| {
            let controller = self.controller.clone();
            let postbox = self.postbox.clone();
            let roster = roster.clone();
            let mut stop = self.stop.subscribe();

            tokio::spawn(async move {
                let mut cycles: u64 = 0;
                loop {
                    let stopped = *stop.borrow();
                    if stopped || max_cycles.map_or(false, |max| cycles >= max) {
                        break;
                    }
                    if let Err(err) = run_one(&controller, &postbox, &mut agent, &roster).await {
                        warn!(agent_id = %agent.id(), error = %err, "Cycle failed, retrying next interval");
                    }
                    cycles += 1;
                    if max_cycles.map_or(false, |max| cycles >= max) {
                        break;
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = stop.changed() => {}
                    }
                }
                info!(agent_id = %agent.id(), cycles, "Agent stopped");
                agent
            })
        });

        let mut finished = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok(agent) => finished.push(agent),
                Err(err) => error!(error = %err, "Agent task panicked"),
            }
        }
        info!(agents = finished.len(), "Swarm stopped");
        finished
    }
}

async fn run_one(
    controller: &CycleController,
    postbox: &Postbox,
    agent: &mut AgentRuntime,
    roster: &[String],
) -> Result<CycleReport, CycleError> {
    for infection in postbox.drain(agent.id()) {
        agent.receive(infection);
    }
    let report = controller.run_cycle(agent, roster).await?;
    for infection in report.outgoing.iter().cloned() {
        postbox.deliver(infection);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parasite_common::{InfectionKind, InfectionPayload};

    #[test]
    fn test_postbox_delivers_by_target() {
        let postbox = Postbox::new();
        for target in ["agent_b", "agent_b", "agent_c"] {
            postbox.deliver(Infection::create(
                "agent_a",
                target,
                InfectionKind::Suggestion,
                InfectionPayload::new("hi"),
            ));
        }
        assert_eq!(postbox.waiting_for("agent_b"), 2);
        assert_eq!(postbox.drain("agent_b").len(), 2);
        assert_eq!(postbox.waiting_for("agent_b"), 0);
        assert!(postbox.drain("agent_zz").is_empty());
        assert_eq!(postbox.waiting_for("agent_c"), 1);
    }

    #[test]
    fn test_stop_handle_is_shared() {
        let stop = StopHandle::new();
        let clone = stop.clone();
        assert!(!stop.is_triggered());
        clone.trigger();
        assert!(stop.is_triggered());
    }
}
