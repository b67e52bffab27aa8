//! In-memory recording collaborators
//!
//! Keeps every call for later inspection. Can be switched to failing mode to
//! check that cycles survive collaborator outages.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parasite_mutation::Mutation;
use parking_lot::Mutex;
use serde_json::Value;

use super::{LedgerSink, PersistenceSink, RepositorySink, SinkError};

#[derive(Debug, Clone, PartialEq)]
pub struct InfectionLog {
    pub attacker_id: String,
    pub target_id: String,
    pub suggestion: String,
    pub accepted: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitLog {
    pub path: String,
    pub content: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RecordingSinks {
    failing: AtomicBool,
    reasoning: Mutex<Vec<(String, String)>>,
    infections: Mutex<Vec<InfectionLog>>,
    mutations: Mutex<Vec<Mutation>>,
    proofs: Mutex<Vec<String>>,
    commits: Mutex<Vec<CommitLog>>,
}

impl RecordingSinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder whose every call fails
    pub fn failing() -> Self {
        let sinks = Self::default();
        sinks.set_failing(true);
        sinks
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SinkError::Unavailable("recording sink set to fail".into()))
        } else {
            Ok(())
        }
    }

    /// `(agent_id, text)` per reasoning log
    pub fn reasoning(&self) -> Vec<(String, String)> {
        self.reasoning.lock().clone()
    }

    pub fn infections(&self) -> Vec<InfectionLog> {
        self.infections.lock().clone()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().clone()
    }

    pub fn proofs(&self) -> Vec<String> {
        self.proofs.lock().clone()
    }

    pub fn commits(&self) -> Vec<CommitLog> {
        self.commits.lock().clone()
    }
}

#[async_trait]
impl PersistenceSink for RecordingSinks {
    async fn log_reasoning(
        &self,
        agent_id: &str,
        text: &str,
        _decision: Option<String>,
        _context: Value,
    ) -> Result<Option<String>, SinkError> {
        self.check()?;
        self.reasoning.lock().push((agent_id.to_string(), text.to_string()));
        Ok(None)
    }

    async fn log_infection(
        &self,
        attacker_id: &str,
        target_id: &str,
        suggestion: &str,
        accepted: bool,
        reason: &str,
    ) -> Result<Option<String>, SinkError> {
        self.check()?;
        self.infections.lock().push(InfectionLog {
            attacker_id: attacker_id.to_string(),
            target_id: target_id.to_string(),
            suggestion: suggestion.to_string(),
            accepted,
            reason: reason.to_string(),
        });
        Ok(None)
    }

    async fn log_mutation(&self, mutation: &Mutation) -> Result<Option<String>, SinkError> {
        self.check()?;
        self.mutations.lock().push(mutation.clone());
        Ok(None)
    }

    async fn log_commit(
        &self,
        _agent_id: &str,
        _path: &str,
        _revision: Option<String>,
        _message: &str,
    ) -> Result<Option<String>, SinkError> {
        self.check()?;
        Ok(None)
    }
}

#[async_trait]
impl LedgerSink for RecordingSinks {
    async fn record_proof(&self, subject_hash: &str) -> Result<Option<String>, SinkError> {
        self.check()?;
        self.proofs.lock().push(subject_hash.to_string());
        Ok(Some(format!("proof-{}", self.proofs.lock().len())))
    }
}

#[async_trait]
impl RepositorySink for RecordingSinks {
    async fn commit_artifact(&self, path: &str, content: &str, message: &str) -> Result<Option<String>, SinkError> {
        self.check()?;
        let mut commits = self.commits.lock();
        commits.push(CommitLog {
            path: path.to_string(),
            content: content.to_string(),
            message: message.to_string(),
        });
        Ok(Some(format!("rev-{}", commits.len())))
    }
}
