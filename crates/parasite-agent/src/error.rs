//! Cycle errors

use parasite_common::{ParasiteError, TransitionError};
use parasite_reasoning::ReasoningError;
use thiserror::Error;

use crate::sinks::SinkError;

/// Why an agent cycle stopped early
///
/// Collaborator failures never appear here; they are logged by the sink worker.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Reasoning failed: {0}")]
    Reasoning(#[from] ReasoningError),

    #[error("Lifecycle violation: {0}")]
    Transition(#[from] TransitionError),
}

impl From<SinkError> for ParasiteError {
    fn from(err: SinkError) -> Self {
        ParasiteError::Sink(err.to_string())
    }
}

impl From<CycleError> for ParasiteError {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::Reasoning(inner) => inner.into(),
            CycleError::Transition(inner) => ParasiteError::Transition(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_into_protocol_error() {
        let sink: ParasiteError = SinkError::Transport("reset".into()).into();
        assert!(matches!(sink, ParasiteError::Sink(msg) if msg.contains("reset")));

        let exhausted = CycleError::Reasoning(ReasoningError::AllProvidersExhausted { failures: Vec::new() });
        assert!(exhausted.to_string().starts_with("Reasoning failed"));
        let _: ParasiteError = exhausted.into();
    }
}
