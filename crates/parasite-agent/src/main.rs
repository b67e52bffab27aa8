//! Parasite Swarm Binary
//!
//! Runs every configured agent until Ctrl-C or the cycle limit.

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parasite_agent::{
    offline_provider, CycleController, CycleSettings, SinkDispatcher, Sinks, Swarm, SwarmConfig, AGENT_VERSION,
};
use parasite_reasoning::{InferenceOrchestrator, InferenceProvider, OrchestratorMetrics, RateLimiter, ReasoningConfig};

/// Log filter used when `RUST_LOG` is unset or blank
const DEFAULT_LOG_FILTER: &str = "info";

fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    info!("Starting Parasite Swarm v{}", AGENT_VERSION);

    let reasoning = ReasoningConfig::load()?;
    let swarm_config = SwarmConfig::load()?;
    info!(
        agents = swarm_config.agents.len(),
        interval_secs = swarm_config.cycle_interval_secs,
        offline = swarm_config.offline,
        "Loaded configuration"
    );

    let registry = Registry::new();
    let metrics = OrchestratorMetrics::new()?;
    metrics.register(&registry)?;

    let limiter = Arc::new(RateLimiter::new(reasoning.rate_limit.max_calls, reasoning.rate_window()));
    let orchestrator = if swarm_config.offline {
        let providers: Vec<Arc<dyn InferenceProvider>> = vec![Arc::new(offline_provider())];
        InferenceOrchestrator::new(providers, limiter)
            .with_retry(reasoning.retry.policy())
            .with_timeout(reasoning.provider_timeout())
            .with_generation(reasoning.max_tokens, reasoning.temperature)
    } else {
        InferenceOrchestrator::from_config(&reasoning, limiter, reqwest::Client::new())
    }
    .with_metrics(metrics);

    let providers = orchestrator.provider_names();
    if providers.is_empty() {
        warn!("No inference provider configured; every cycle will fail until one is");
    } else {
        info!(providers = ?providers, "Inference providers ranked");
    }

    let (sinks, worker) = SinkDispatcher::spawn(Sinks::tracing(), swarm_config.sink_queue);
    let controller = Arc::new(
        CycleController::new(Arc::new(orchestrator), sinks)
            .with_settings(CycleSettings::from_configs(&reasoning, &swarm_config)),
    );

    let swarm = Swarm::new(swarm_config, controller.clone());
    let stop = swarm.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                stop.trigger();
            }
            Err(err) => warn!(error = %err, "Failed to install Ctrl-C handler"),
        }
    });

    let agents = swarm.run().await;
    for agent in &agents {
        let status = agent.status();
        info!(
            agent_id = %status.agent_id,
            iteration = status.iteration,
            chimera = status.chimera.chimera_percentage,
            accepted = status.inbox.accepted,
            mutated = status.inbox.mutated,
            rejected = status.inbox.rejected,
            sent = status.inbox.sent,
            "Final status"
        );
    }

    // the worker drains once the last handle is gone
    drop(agents);
    drop(controller);
    let stats = worker.finish().await;
    info!(delivered = stats.delivered, failed = stats.failed, dropped = stats.dropped, "Sinks drained");

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    debug!(metrics = %String::from_utf8_lossy(&buffer), "Final metrics");

    info!("Shutting down Parasite Swarm");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(env_filter(None).to_string(), "info");
        assert_eq!(env_filter(Some("  ")).to_string(), "info");
        assert_eq!(env_filter(Some("parasite_agent=debug")).to_string(), "parasite_agent=debug");
    }
}
