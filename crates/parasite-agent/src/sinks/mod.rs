//! External collaborators
//!
//! The cycle reports outcomes to three best-effort sinks:
//!
//! - [`PersistenceSink`]: reasoning, proposal and mutation logs
//! - [`LedgerSink`]: timestamps content hashes
//! - [`RepositorySink`]: publishes agent artifacts
//!
//! Calls never run on the cycle's own task. The controller hands a
//! [`SinkEvent`] to the [`dispatcher`], whose worker performs the calls and
//! logs failures.

pub mod dispatcher;
pub mod memory;
pub mod tracing_sink;

use std::sync::Arc;

use async_trait::async_trait;
use parasite_mutation::Mutation;
use serde_json::Value;
use thiserror::Error;

pub use dispatcher::{DispatchStats, SinkDispatcher, SinkHandle, SinkWorker};
pub use memory::RecordingSinks;
pub use tracing_sink::TracingSinks;

/// Errors raised by a collaborator
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected the call: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Logging backend for reasoning, proposals and mutations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn log_reasoning(
        &self,
        agent_id: &str,
        text: &str,
        decision: Option<String>,
        context: Value,
    ) -> Result<Option<String>, SinkError>;

    async fn log_infection(
        &self,
        attacker_id: &str,
        target_id: &str,
        suggestion: &str,
        accepted: bool,
        reason: &str,
    ) -> Result<Option<String>, SinkError>;

    async fn log_mutation(&self, mutation: &Mutation) -> Result<Option<String>, SinkError>;

    async fn log_commit(
        &self,
        agent_id: &str,
        path: &str,
        revision: Option<String>,
        message: &str,
    ) -> Result<Option<String>, SinkError>;
}

/// Public ledger used only to timestamp hashes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Returns a reference (e.g. transaction signature) when one was produced
    async fn record_proof(&self, subject_hash: &str) -> Result<Option<String>, SinkError>;
}

/// Source-control host that receives agent artifacts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositorySink: Send + Sync {
    /// Returns the new revision id when one was produced
    async fn commit_artifact(&self, path: &str, content: &str, message: &str) -> Result<Option<String>, SinkError>;
}

/// The three collaborators a cycle reports to
#[derive(Clone)]
pub struct Sinks {
    pub persistence: Arc<dyn PersistenceSink>,
    pub ledger: Arc<dyn LedgerSink>,
    pub repository: Arc<dyn RepositorySink>,
}

impl Sinks {
    pub fn new(
        persistence: Arc<dyn PersistenceSink>,
        ledger: Arc<dyn LedgerSink>,
        repository: Arc<dyn RepositorySink>,
    ) -> Self {
        Self {
            persistence,
            ledger,
            repository,
        }
    }

    /// All three collaborators backed by log lines only
    pub fn tracing() -> Self {
        let sinks = Arc::new(TracingSinks);
        Self::new(sinks.clone(), sinks.clone(), sinks)
    }

    /// All three collaborators backed by one recorder
    pub fn recording(recorder: Arc<RecordingSinks>) -> Self {
        Self::new(recorder.clone(), recorder.clone(), recorder)
    }
}

/// One unit of work for the dispatcher
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Reasoning {
        agent_id: String,
        text: String,
        decision: Option<String>,
        context: Value,
    },
    Infection {
        attacker_id: String,
        target_id: String,
        suggestion: String,
        accepted: bool,
        reason: String,
    },
    Mutation(Box<Mutation>),
    Proof {
        subject_hash: String,
    },
    Commit {
        agent_id: String,
        path: String,
        content: String,
        message: String,
    },
}

impl SinkEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkEvent::Reasoning { .. } => "reasoning",
            SinkEvent::Infection { .. } => "infection",
            SinkEvent::Mutation(_) => "mutation",
            SinkEvent::Proof { .. } => "proof",
            SinkEvent::Commit { .. } => "commit",
        }
    }
}
