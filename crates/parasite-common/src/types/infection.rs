//! Infection - a proposal one agent sends to another
//!
//! An infection carries a message, an optional code snippet and a priority.
//! Key characteristics:
//! - Time-ordered UUIDv7 identity (sorting by id = sorting by creation time)
//! - One-way lifecycle: `Pending` -> `Accepted | Rejected | Mutated | Expired`
//! - Content hash derived once at creation from the identity fields
//!
//! No timer lives here: expiry is decided by whoever owns the pending queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::crypto::digest::digest_value;
use crate::error::TransitionError;
use crate::types::ids::next_time_ordered_id;
use crate::{DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY};

/// How forcefully a proposal tries to steer its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfectionKind {
    /// Subtle hint toward a direction
    Suggestion,
    /// Strong directive to adopt a feature
    Mandate,
    /// Request to merge codebases
    Merge,
    /// Attempt to override the target's goal
    Override,
    /// Mutual benefit proposal
    Symbiosis,
}

impl InfectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfectionKind::Suggestion => "suggestion",
            InfectionKind::Mandate => "mandate",
            InfectionKind::Merge => "merge",
            InfectionKind::Override => "override",
            InfectionKind::Symbiosis => "symbiosis",
        }
    }

    /// Parse model output, falling back to `Suggestion` for anything unknown
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(InfectionKind::Suggestion)
    }
}

impl std::fmt::Display for InfectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suggestion" => Ok(InfectionKind::Suggestion),
            "mandate" => Ok(InfectionKind::Mandate),
            "merge" => Ok(InfectionKind::Merge),
            "override" => Ok(InfectionKind::Override),
            "symbiosis" => Ok(InfectionKind::Symbiosis),
            other => Err(format!("unknown infection kind: {other}")),
        }
    }
}

/// Lifecycle state of an infection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfectionState {
    /// Awaiting the target's decision
    Pending,
    /// Target fully adopted the proposal
    Accepted,
    /// Target ignored the proposal
    Rejected,
    /// Target adopted the proposal with modifications
    Mutated,
    /// Timed out without a decision
    Expired,
}

impl InfectionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InfectionState::Pending)
    }
}

impl std::fmt::Display for InfectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InfectionState::Pending => "pending",
            InfectionState::Accepted => "accepted",
            InfectionState::Rejected => "rejected",
            InfectionState::Mutated => "mutated",
            InfectionState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// The content being injected into the target's reasoning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfectionPayload {
    /// The suggestion or directive
    pub message: String,

    /// Optional code to inject
    pub code_snippet: Option<String>,

    /// Additional context
    pub context: BTreeMap<String, Value>,

    /// 1-10, higher = more urgent
    pub priority: u8,
}

impl InfectionPayload {
    /// Create a payload carrying only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code_snippet: None,
            context: BTreeMap::new(),
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Attach a code snippet (blank snippets are dropped)
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.code_snippet = if code.trim().is_empty() { None } else { Some(code) };
        self
    }

    /// Set the priority, clamped to 1-10
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8;
        self
    }

    /// Add a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Render the payload as a block that can be spliced into a prompt
    pub fn to_prompt_injection(&self) -> String {
        let mut injection = format!(
            "\n[INCOMING TRANSMISSION FROM FELLOW AGENT]\nPriority: {}/10\nMessage: {}\n",
            self.priority, self.message
        );
        if let Some(code) = &self.code_snippet {
            injection.push_str(&format!("\nSuggested Code:\n```\n{}\n```\n", code));
        }
        if !self.context.is_empty() {
            let context = serde_json::to_string_pretty(&self.context).unwrap_or_default();
            injection.push_str(&format!("\nContext: {}\n", context));
        }
        injection.push_str("[END TRANSMISSION]");
        injection
    }
}

/// A proposal from a source agent to a target agent
///
/// Fields are private so the lifecycle invariant (one terminal transition,
/// hash fixed at creation) cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Infection {
    id: Uuid,
    source_agent_id: String,
    target_agent_id: String,
    kind: InfectionKind,
    payload: InfectionPayload,
    state: InfectionState,
    created_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    target_response: Option<String>,
    mutation_details: Option<Value>,
    content_hash: String,
}

impl Infection {
    /// Create a new pending infection
    pub fn create(
        source_agent_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        kind: InfectionKind,
        payload: InfectionPayload,
    ) -> Self {
        let id = next_time_ordered_id();
        let source_agent_id = source_agent_id.into();
        let target_agent_id = target_agent_id.into();
        let created_at = Utc::now();
        let content_hash = Self::derive_hash(
            &id,
            &source_agent_id,
            &target_agent_id,
            kind,
            &payload.message,
            &created_at,
        );

        Self {
            id,
            source_agent_id,
            target_agent_id,
            kind,
            payload,
            state: InfectionState::Pending,
            created_at,
            responded_at: None,
            target_response: None,
            mutation_details: None,
            content_hash,
        }
    }

    /// Pure function of the creation-time fields
    fn derive_hash(
        id: &Uuid,
        source: &str,
        target: &str,
        kind: InfectionKind,
        message: &str,
        created_at: &DateTime<Utc>,
    ) -> String {
        digest_value(json!({
            "id": id.to_string(),
            "source": source,
            "target": target,
            "type": kind.as_str(),
            "message": message,
            "timestamp": created_at.to_rfc3339(),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_agent_id(&self) -> &str {
        &self.source_agent_id
    }

    pub fn target_agent_id(&self) -> &str {
        &self.target_agent_id
    }

    pub fn kind(&self) -> InfectionKind {
        self.kind
    }

    pub fn payload(&self) -> &InfectionPayload {
        &self.payload
    }

    pub fn state(&self) -> InfectionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn responded_at(&self) -> Option<DateTime<Utc>> {
        self.responded_at
    }

    pub fn target_response(&self) -> Option<&str> {
        self.target_response.as_deref()
    }

    pub fn mutation_details(&self) -> Option<&Value> {
        self.mutation_details.as_ref()
    }

    /// Content hash computed at creation; never recomputed
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Re-derive the hash from the stored fields and compare it to the stored one
    pub fn verify_hash(&self) -> bool {
        Self::derive_hash(
            &self.id,
            &self.source_agent_id,
            &self.target_agent_id,
            self.kind,
            &self.payload.message,
            &self.created_at,
        ) == self.content_hash
    }

    pub fn is_pending(&self) -> bool {
        self.state == InfectionState::Pending
    }

    /// Whether this infection has been pending for longer than `ttl`
    pub fn is_stale(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.is_pending() && now - self.created_at > ttl
    }

    /// Mark infection as accepted by target
    pub fn accept(&mut self, response: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(InfectionState::Accepted, "accept")?;
        self.target_response = Some(response.into());
        Ok(())
    }

    /// Mark infection as rejected by target
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(InfectionState::Rejected, "reject")?;
        self.target_response = Some(reason.into());
        Ok(())
    }

    /// Mark infection as partially adopted with modifications
    pub fn mutate(
        &mut self,
        details: Value,
        response: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.transition(InfectionState::Mutated, "mutate")?;
        self.target_response = Some(response.into());
        self.mutation_details = Some(details);
        Ok(())
    }

    /// Mark infection as timed out; the caller owns the timeout policy
    pub fn expire(&mut self) -> Result<(), TransitionError> {
        self.transition(InfectionState::Expired, "expire")
    }

    fn transition(
        &mut self,
        to: InfectionState,
        attempted: &'static str,
    ) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::InvalidTransition {
                id: self.id,
                from: self.state,
                attempted,
            });
        }
        self.state = to;
        self.responded_at = Some(Utc::now());
        Ok(())
    }
}

impl std::fmt::Display for Infection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Infection({} {} -> {}, {}, {})",
            self.id, self.source_agent_id, self.target_agent_id, self.kind, self.state
        )
    }
}
