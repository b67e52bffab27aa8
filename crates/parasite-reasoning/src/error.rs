//! Provider and orchestration errors

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single inference provider call
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Required credential or endpoint is missing; skipped silently
    #[error("provider not configured")]
    Unavailable,

    /// Backend signalled quota exhaustion; skip forward, never retry
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Non-success HTTP status
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Connection level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Per-call deadline elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Response body did not have the expected shape
    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether the retry wrapper should re-invoke the call
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::Unavailable | ProviderError::RateLimited { .. }
        )
    }

    /// Short label used for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            ProviderError::Unavailable => "unavailable",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Status { .. } => "status",
            ProviderError::Transport(_) => "transport",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// One provider's failure during a single orchestrated call
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Errors surfaced by the orchestrator to its caller
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// Every provider in the ranked list failed or was unconfigured
    #[error("all providers exhausted: [{}]", summarize(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },
}

impl ReasoningError {
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            ReasoningError::AllProvidersExhausted { failures } => failures,
        }
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

fn summarize(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ReasoningError> for parasite_common::ParasiteError {
    fn from(err: ReasoningError) -> Self {
        parasite_common::ParasiteError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_not_retryable() {
        assert!(!ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ProviderError::Unavailable.is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
    }

    #[test]
    fn test_exhausted_summary_lists_every_provider() {
        let err = ReasoningError::AllProvidersExhausted {
            failures: vec![
                ProviderFailure {
                    provider: "groq".into(),
                    error: ProviderError::RateLimited {
                        retry_after: Some(Duration::from_secs(7)),
                    },
                },
                ProviderFailure {
                    provider: "gemini".into(),
                    error: ProviderError::Status {
                        code: 500,
                        body: "boom".into(),
                    },
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("groq: rate limited (retry after 7s)"));
        assert!(text.contains("gemini: HTTP 500: boom"));
        assert_eq!(err.failures().len(), 2);
    }
}
