//! Offline reasoning
//!
//! Canned replies keyed on the prompt's mode marker so the swarm can run end
//! to end without hosted models.

use parasite_reasoning::{ScriptedProvider, ScriptedReply};

pub const OFFLINE_PROVIDER: &str = "offline";

const PLAN: &str = "1. Tighten input validation.\n2. Add a small helper for the core loop.\n3. Keep public signatures stable.";

const CODE: &str = "```rust\npub fn checked_step(value: u64, delta: u64) -> Option<u64> {\n    value.checked_add(delta)\n}\n```";

// Targets are resolved against the live roster; unknown ones are redirected
const PROPOSALS: &str = r#"[
  {
    "target_agent_id": "any",
    "infection_type": "suggestion",
    "message": "Guard arithmetic with checked operations",
    "code_snippet": "pub fn saturating_total(values: &[u64]) -> u64 {\n    values.iter().fold(0u64, |acc, v| acc.saturating_add(*v))\n}",
    "priority": 6
  }
]"#;

const DEFENSE: &str = "ACCEPT: the proposal is small and fits the current design.";

/// Scripted provider answering every inference mode
pub fn offline_provider() -> ScriptedProvider {
    ScriptedProvider::answering(OFFLINE_PROVIDER, PLAN)
        .with_rule("MODE: CODING", ScriptedReply::text(CODE))
        .with_rule("MODE: INFECTION CREATION", ScriptedReply::text(PROPOSALS))
        .with_rule("MODE: DEFENSE", ScriptedReply::text(DEFENSE))
}
