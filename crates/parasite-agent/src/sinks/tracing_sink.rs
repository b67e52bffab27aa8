//! Collaborators that only emit log lines

use async_trait::async_trait;
use parasite_common::crypto::short_digest;
use parasite_mutation::Mutation;
use serde_json::Value;
use tracing::info;

use super::{LedgerSink, PersistenceSink, RepositorySink, SinkError};

/// Default sinks when no external services are wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSinks;

#[async_trait]
impl PersistenceSink for TracingSinks {
    async fn log_reasoning(
        &self,
        agent_id: &str,
        text: &str,
        decision: Option<String>,
        _context: Value,
    ) -> Result<Option<String>, SinkError> {
        info!(
            target: "parasite::persistence",
            agent_id = %agent_id,
            chars = text.len(),
            decision = decision.as_deref().unwrap_or("-"),
            "reasoning"
        );
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
        info!(
            target: "parasite::persistence",
            attacker = %attacker_id,
            target_agent = %target_id,
            accepted,
            reason = %reason,
            suggestion = %suggestion.chars().take(80).collect::<String>(),
            "infection"
        );
        Ok(None)
    }

    async fn log_mutation(&self, mutation: &Mutation) -> Result<Option<String>, SinkError> {
        info!(
            target: "parasite::persistence",
            agent_id = %mutation.agent_id(),
            source = %mutation.source_agent_id(),
            mutation_type = %mutation.mutation_type(),
            hash = %mutation.content_hash(),
            "mutation"
        );
        Ok(None)
    }

    async fn log_commit(
        &self,
        agent_id: &str,
        path: &str,
        revision: Option<String>,
        message: &str,
    ) -> Result<Option<String>, SinkError> {
        info!(
            target: "parasite::persistence",
            agent_id = %agent_id,
            path = %path,
            revision = revision.as_deref().unwrap_or("-"),
            message = %message,
            "commit"
        );
        Ok(None)
    }
}

#[async_trait]
impl LedgerSink for TracingSinks {
    async fn record_proof(&self, subject_hash: &str) -> Result<Option<String>, SinkError> {
        info!(target: "parasite::ledger", hash = %subject_hash, "proof");
        Ok(None)
    }
}

#[async_trait]
impl RepositorySink for TracingSinks {
    async fn commit_artifact(&self, path: &str, content: &str, message: &str) -> Result<Option<String>, SinkError> {
        let revision = short_digest(content);
        info!(
            target: "parasite::repository",
            path = %path,
            bytes = content.len(),
            revision = %revision,
            message = %message,
            "commit"
        );
        Ok(Some(revision))
    }
}
