//! Inference providers
//!
//! Each backend implements [`InferenceProvider`]; the orchestrator holds them
//! in a priority-ordered list built at startup.

pub mod gemini;
pub mod huggingface;
pub mod ollama;
pub mod openai_compat;
pub mod scripted;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ReasoningConfig;
use crate::error::ProviderError;

pub use gemini::GeminiProvider;
pub use huggingface::HuggingFaceProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{ScriptedProvider, ScriptedReply};

/// One generative call
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCall {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Overrides the provider's configured model
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Trait for generative text backends
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Stable lowercase name (`groq`, `gemini`, ...)
    fn name(&self) -> &str;

    /// Whether the required credential or endpoint is present
    fn is_configured(&self) -> bool;

    /// Run one completion and return the raw text
    async fn call(&self, request: &ProviderCall) -> Result<String, ProviderError>;
}

/// Default ranking, fastest and cheapest first
pub const DEFAULT_PRIORITY: &[&str] = &["groq", "gemini", "openrouter", "deepseek", "huggingface", "ollama"];

/// Build the hosted and local providers from configuration, in default priority order
pub fn build_providers(
    config: &ReasoningConfig,
    client: reqwest::Client,
) -> Vec<Arc<dyn InferenceProvider>> {
    vec![
        Arc::new(OpenAiCompatProvider::groq(&config.groq, client.clone())),
        Arc::new(GeminiProvider::new(&config.gemini, client.clone())),
        Arc::new(OpenAiCompatProvider::openrouter(&config.openrouter, client.clone())),
        Arc::new(OpenAiCompatProvider::deepseek(&config.deepseek, client.clone())),
        Arc::new(HuggingFaceProvider::new(&config.huggingface, client.clone())),
        Arc::new(OllamaProvider::new(&config.ollama, client)),
    ]
}

/// Map a non-success response to a provider error
///
/// 429 becomes `RateLimited`, honouring a numeric `Retry-After` header.
pub(crate) async fn status_error(response: reqwest::Response) -> ProviderError {
    let code = response.status().as_u16();
    if code == 429 {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return ProviderError::RateLimited { retry_after };
    }
    let body = response.text().await.unwrap_or_default();
    ProviderError::Status {
        code,
        body: body.chars().take(300).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_defaults() {
        let providers = build_providers(&ReasoningConfig::default(), reqwest::Client::new());
        let names: Vec<_> = providers.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, DEFAULT_PRIORITY);
        assert!(providers.iter().all(|p| !p.is_configured()));
    }
}
