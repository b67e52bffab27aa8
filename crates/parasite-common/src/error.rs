//! Error types for the Memory Parasite Protocol
//!
//! Provides a unified error type and the lifecycle error variant

use thiserror::Error;
use uuid::Uuid;

use crate::types::infection::InfectionState;

/// Result type alias using ParasiteError
pub type Result<T> = std::result::Result<T, ParasiteError>;

/// Unified error type for protocol operations
#[derive(Debug, Error)]
pub enum ParasiteError {
    // Lifecycle errors
    #[error("Lifecycle error: {0}")]
    Transition(#[from] TransitionError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // External collaborator errors
    #[error("Sink error: {0}")]
    Sink(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Proposal lifecycle errors
///
/// Raised only when a caller tries to resolve a proposal that already left
/// `Pending`. This is a caller bug, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition for infection {id}: cannot {attempted} from {from}")]
    InvalidTransition {
        id: Uuid,
        from: InfectionState,
        attempted: &'static str,
    },
}

impl From<serde_json::Error> for ParasiteError {
    fn from(err: serde_json::Error) -> Self {
        ParasiteError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ParasiteError {
    fn from(err: anyhow::Error) -> Self {
        ParasiteError::Internal(err.to_string())
    }
}
