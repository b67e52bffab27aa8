//! # Parasite Agent
//!
//! Runs agents through their reasoning cycle and lets them exchange proposals.
//!
//! ## Cycle
//!
//! ```text
//! ┌─────────────────────────── CycleController ───────────────────────────┐
//! │ expire ─► plan ─► code ─► defense ─► infection ─► iteration += 1      │
//! │                              │            │                           │
//! │                      MutationEngine    outgoing proposals ─► Postbox  │
//! └───────────────────────────────┬───────────────────────────────────────┘
//!                                 │ SinkEvent (non-blocking)
//!                                 ▼
//!                   SinkDispatcher ─► persistence / ledger / repository
//! ```
//!
//! ## Running
//!
//! The `parasite-swarm` binary runs the configured roster until Ctrl-C or
//! `PARASITE_MAX_CYCLES`. Set `PARASITE_OFFLINE=1` to use canned replies
//! instead of hosted models.

pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod inbox;
pub mod offline;
pub mod sinks;
pub mod swarm;

pub use agent::{AgentRuntime, AgentState, AgentStatus, ReasoningEntry, HISTORY_WINDOW, REASONING_LOG_CAP};
pub use config::{default_roster, AgentProfile, SwarmConfig};
pub use controller::{CycleController, CycleReport, CycleSettings, DecisionRecord, DEFAULT_PROPOSAL_MESSAGE};
pub use error::CycleError;
pub use inbox::{Inbox, InboxStats};
pub use offline::offline_provider;
pub use sinks::{
    DispatchStats, LedgerSink, PersistenceSink, RecordingSinks, RepositorySink, SinkDispatcher, SinkError,
    SinkEvent, SinkHandle, SinkWorker, Sinks, TracingSinks,
};
pub use swarm::{Postbox, StopHandle, Swarm};

/// Agent crate version
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
