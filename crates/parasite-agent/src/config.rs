//! Swarm configuration

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One agent in the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub goal: String,
    /// Provider moved to the front of the ranking for this agent's calls
    pub preferred_provider: Option<String>,
    pub model: Option<String>,
    /// 0-1, chance of running the proposal phase in a cycle
    pub aggressiveness: f64,
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            goal: goal.into(),
            preferred_provider: None,
            model: None,
            aggressiveness: 0.5,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_aggressiveness(mut self, aggressiveness: f64) -> Self {
        self.aggressiveness = aggressiveness.clamp(0.0, 1.0);
        self
    }

    /// Artifact an agent starts from before its first coding phase
    pub fn seed_code(&self) -> String {
        format!(
            "//! {}\n//! Goal: {}\n\npub const AGENT_ID: &str = \"{}\";\n\nfn main() {{\n    println!(\"{{}} online\", AGENT_ID);\n}}\n",
            self.name, self.goal, self.id
        )
    }
}

/// Default five-agent roster
pub fn default_roster() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new(
            "agent_a",
            "DEX Builder",
            "Build a decentralized exchange on Solana with AMM pools, token swaps, liquidity provision and price discovery",
        )
        .with_provider("groq")
        .with_aggressiveness(0.7),
        AgentProfile::new(
            "agent_b",
            "NFT Marketplace Builder",
            "Build an NFT marketplace on Solana with minting, listings, auctions and royalties",
        )
        .with_provider("openrouter")
        .with_aggressiveness(0.5),
        AgentProfile::new(
            "agent_c",
            "Lending Protocol Builder",
            "Build a lending protocol on Solana with collateralized loans, interest rate models and liquidations",
        )
        .with_provider("deepseek")
        .with_model("deepseek-chat")
        .with_aggressiveness(0.8),
        AgentProfile::new(
            "agent_d",
            "Privacy Wallet Builder",
            "Build a privacy-preserving wallet on Solana with stealth addresses and shielded transfers",
        )
        .with_provider("gemini")
        .with_aggressiveness(0.3),
        AgentProfile::new(
            "agent_e",
            "DAO Governance Builder",
            "Build a DAO governance system on Solana with proposals, token-weighted voting and a treasury",
        )
        .with_provider("openrouter")
        .with_aggressiveness(0.6),
    ]
}

/// Swarm runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub agents: Vec<AgentProfile>,
    /// Pause between one agent's cycles
    pub cycle_interval_secs: u64,
    /// Most proposals an agent sends per cycle
    pub max_infections_per_cycle: usize,
    /// Pending proposals older than this are expired before the defense phase
    pub proposal_ttl_secs: u64,
    /// Capacity of the background sink queue
    pub sink_queue: usize,
    /// Use the scripted offline provider instead of hosted models
    pub offline: bool,
    /// Stop each agent after this many cycles
    pub max_cycles: Option<u64>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            agents: default_roster(),
            cycle_interval_secs: 1200,
            max_infections_per_cycle: 3,
            proposal_ttl_secs: 3600,
            sink_queue: 256,
            offline: false,
            max_cycles: None,
        }
    }
}

impl SwarmConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        parse_into("AGENT_CYCLE_INTERVAL", &mut cfg.cycle_interval_secs);
        parse_into("MAX_INFECTIONS_PER_CYCLE", &mut cfg.max_infections_per_cycle);
        parse_into("PARASITE_PROPOSAL_TTL_SECS", &mut cfg.proposal_ttl_secs);
        parse_into("PARASITE_SINK_QUEUE", &mut cfg.sink_queue);

        if let Ok(val) = std::env::var("PARASITE_OFFLINE") {
            cfg.offline = matches!(val.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(val) = std::env::var("PARASITE_MAX_CYCLES") {
            if let Ok(v) = val.trim().parse() {
                cfg.max_cycles = Some(v);
            }
        }
        if let Ok(ids) = std::env::var("PARASITE_AGENT_IDS") {
            cfg.retain_agents(&ids);
        }

        Ok(cfg)
    }

    /// Keep only the agents named in a comma-separated list (blank keeps all)
    pub fn retain_agents(&mut self, ids: &str) {
        let wanted: Vec<&str> = ids.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        if !wanted.is_empty() {
            self.agents.retain(|a| wanted.contains(&a.id.as_str()));
        }
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn proposal_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.proposal_ttl_secs.min(i64::MAX as u64) as i64)
    }
}

fn parse_into<T: std::str::FromStr>(var: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(var) {
        if let Ok(v) = val.trim().parse() {
            *slot = v;
        }
    }
}
