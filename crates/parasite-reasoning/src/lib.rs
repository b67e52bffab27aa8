//! # Parasite Reasoning
//!
//! The decision pipeline behind every agent: provider orchestration with
//! failover, and interpretation of freeform model output.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                InferenceOrchestrator                 │
//! │   ranked providers ─► RateLimiter ─► RetryPolicy     │
//! │          │                                 │         │
//! │   ┌──────┴──────┐                 ┌────────┴──────┐  │
//! │   │   prompts   │                 │  interpreter  │  │
//! │   │ (per mode)  │                 │ code / JSON / │  │
//! │   └─────────────┘                 │ plain verdict │  │
//! │                                   └───────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Providers
//!
//! - OpenAI-compatible chat completions: Groq, OpenRouter, DeepSeek
//! - Gemini `generateContent`
//! - HuggingFace hosted inference
//! - Local Ollama
//! - [`ScriptedProvider`] for offline runs and tests

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod metrics;
pub mod orchestrator;

pub use config::ReasoningConfig;
pub use domain::interpreter::interpret;
pub use domain::request::{
    Decision, DecisionKind, InferenceMode, InferenceRequest, InferenceResult, ProposalDigest,
    ProposedInfection,
};
pub use error::{ProviderError, ProviderFailure, ReasoningError};
pub use infra::providers::{InferenceProvider, ProviderCall, ScriptedProvider, ScriptedReply};
pub use infra::rate_limiter::RateLimiter;
pub use infra::retry::{with_retry, RetryPolicy};
pub use metrics::OrchestratorMetrics;
pub use orchestrator::InferenceOrchestrator;
