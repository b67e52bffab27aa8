//! Inference Orchestrator
//!
//! Tries a ranked list of providers until one answers:
//!
//! 1. Rank providers; a preferred provider moves to the front, the rest keep their order
//! 2. Skip providers without credentials (silently)
//! 3. Acquire the provider's rate-limit slot, then call it under retry and a per-call timeout
//! 4. Rate-limited providers are skipped without retrying
//! 5. Any failure is recorded and the next provider is tried
//!
//! Only [`ReasoningError::AllProvidersExhausted`] reaches the caller.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ReasoningConfig;
use crate::domain::interpreter;
use crate::domain::prompts;
use crate::domain::request::{InferenceRequest, InferenceResult};
use crate::error::{ProviderError, ProviderFailure, ReasoningError};
use crate::infra::providers::{build_providers, InferenceProvider, ProviderCall};
use crate::infra::rate_limiter::RateLimiter;
use crate::infra::retry::RetryPolicy;
use crate::metrics::OrchestratorMetrics;

/// Successful dispatch: text, serving provider, failures before it
struct Dispatched {
    text: String,
    provider: String,
    failures: Vec<ProviderFailure>,
}

pub struct InferenceOrchestrator {
    providers: Vec<Arc<dyn InferenceProvider>>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    call_timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    preferred: Option<String>,
    metrics: Option<OrchestratorMetrics>,
}

impl InferenceOrchestrator {
    /// Create an orchestrator over `providers`, listed in default priority order
    pub fn new(providers: Vec<Arc<dyn InferenceProvider>>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            providers,
            limiter,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
            max_tokens: 1024,
            temperature: 0.7,
            preferred: None,
            metrics: None,
        }
    }

    /// Build the hosted and local providers from configuration
    pub fn from_config(config: &ReasoningConfig, limiter: Arc<RateLimiter>, client: reqwest::Client) -> Self {
        Self::new(build_providers(config, client), limiter)
            .with_retry(config.retry.policy())
            .with_timeout(config.provider_timeout())
            .with_generation(config.max_tokens, config.temperature)
            .with_preferred(config.preferred_provider.clone())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Provider moved to the front when a request names none
    pub fn with_preferred(mut self, provider: Option<String>) -> Self {
        self.preferred = provider;
        self
    }

    pub fn with_metrics(mut self, metrics: OrchestratorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Names of the providers in default order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run a typed request and interpret the answer for its mode
    #[instrument(skip(self, request), fields(agent_id = %request.agent_id, mode = %request.mode))]
    pub async fn reason(&self, request: &InferenceRequest) -> Result<InferenceResult, ReasoningError> {
        let prompt = prompts::build(request);
        let call = ProviderCall {
            system_prompt: prompt.system,
            user_prompt: prompt.user,
            model: request.model_override.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let dispatched = self.dispatch(request.provider_override.as_deref(), &call).await?;

        let mut result = interpreter::interpret(request.mode, &dispatched.text);
        result.provider = Some(dispatched.provider);
        result.failures = dispatched.failures;
        Ok(result)
    }

    /// Run an ad hoc prompt through the same fallback chain and return the raw text
    #[instrument(skip(self, prompt, system_message))]
    pub async fn raw_reason(
        &self,
        prompt: &str,
        system_message: &str,
        provider: Option<&str>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, ReasoningError> {
        let call = ProviderCall {
            system_prompt: system_message.to_string(),
            user_prompt: prompt.to_string(),
            model: None,
            max_tokens: max_tokens.unwrap_or(self.max_tokens),
            temperature: temperature.unwrap_or(self.temperature),
        };
        self.dispatch(provider, &call).await.map(|d| d.text)
    }

    /// Providers in the order they will be tried
    fn ranked(&self, requested: Option<&str>) -> Vec<Arc<dyn InferenceProvider>> {
        let mut ranked = self.providers.clone();
        let front = requested.or(self.preferred.as_deref());
        if let Some(name) = front {
            if let Some(pos) = ranked.iter().position(|p| p.name().eq_ignore_ascii_case(name)) {
                let chosen = ranked.remove(pos);
                ranked.insert(0, chosen);
            }
        }
        ranked
    }

    async fn dispatch(&self, requested: Option<&str>, call: &ProviderCall) -> Result<Dispatched, ReasoningError> {
        let mut failures = Vec::new();
        let ranked = self.ranked(requested);
        let model_owner = model_owner(&ranked, requested);
        // fallbacks answer with their own configured model
        let fallback_call = ProviderCall {
            model: None,
            ..call.clone()
        };

        for provider in ranked {
            let name = provider.name().to_string();
            if !provider.is_configured() {
                debug!(provider = %name, "Provider not configured, skipping");
                continue;
            }

            self.limiter.acquire(&name).await;

            let call = if model_owner.as_deref() == Some(name.as_str()) {
                call
            } else {
                &fallback_call
            };
            match self.call_with_retry(provider.as_ref(), call).await {
                Ok(text) => {
                    self.record(&name, "ok");
                    info!(provider = %name, failed_before = failures.len(), "Provider answered");
                    return Ok(Dispatched {
                        text,
                        provider: name,
                        failures,
                    });
                }
                Err(err) => {
                    self.record(&name, err.outcome());
                    match &err {
                        ProviderError::RateLimited { .. } => {
                            warn!(provider = %name, error = %err, "Provider rate limited, trying next")
                        }
                        _ => warn!(provider = %name, error = %err, "Provider failed, trying next"),
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.fallbacks.inc();
                    }
                    failures.push(ProviderFailure {
                        provider: name,
                        error: err,
                    });
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.exhausted.inc();
        }
        error!(failures = failures.len(), "All providers exhausted");
        Err(ReasoningError::AllProvidersExhausted { failures })
    }

    async fn call_with_retry(&self, provider: &dyn InferenceProvider, call: &ProviderCall) -> Result<String, ProviderError> {
        let timeout = self.call_timeout;
        self.retry
            .run_if(
                provider.name(),
                move || async move {
                    match tokio::time::timeout(timeout, provider.call(call)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(timeout)),
                    }
                },
                ProviderError::is_retryable,
            )
            .await
    }

    fn record(&self, provider: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_call(provider, outcome);
        }
    }
}

/// Provider a request's model override was meant for
///
/// The named provider when the request names one (and it exists), otherwise
/// the first ranked provider that is configured.
fn model_owner(ranked: &[Arc<dyn InferenceProvider>], requested: Option<&str>) -> Option<String> {
    let owner = match requested {
        Some(wanted) => ranked.iter().find(|p| p.name().eq_ignore_ascii_case(wanted)),
        None => ranked.iter().find(|p| p.is_configured()),
    };
    owner.map(|p| p.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::{DecisionKind, InferenceMode};
    use crate::infra::providers::{ScriptedProvider, ScriptedReply};

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(100, Duration::from_secs(60)))
    }

    fn orchestrator(providers: Vec<Arc<ScriptedProvider>>) -> InferenceOrchestrator {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn InferenceProvider>)
            .collect();
        InferenceOrchestrator::new(providers, limiter())
            .with_retry(RetryPolicy::new(2, Duration::from_millis(10), 2.0))
    }

    fn code_request() -> InferenceRequest {
        InferenceRequest::new(InferenceMode::GenerateCode, "agent_a", "Build a DEX")
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_third_provider() {
        let p1 = Arc::new(ScriptedProvider::failing("p1", "down"));
        let p2 = Arc::new(ScriptedProvider::failing("p2", "down"));
        let p3 = Arc::new(ScriptedProvider::answering("p3", "```rust\nfn swap() {}\n```"));
        let orch = orchestrator(vec![p1.clone(), p2.clone(), p3.clone()]);

        let result = orch.reason(&code_request()).await.unwrap();
        assert_eq!(result.provider.as_deref(), Some("p3"));
        assert_eq!(result.code_output.as_deref(), Some("fn swap() {}"));
        assert_eq!(result.failures.len(), 2);
        // transient failures use the full retry budget
        assert_eq!(p1.calls(), 2);
        assert_eq!(p3.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_exhausted() {
        let orch = orchestrator(vec![
            Arc::new(ScriptedProvider::failing("p1", "a")),
            Arc::new(ScriptedProvider::failing("p2", "b")),
            Arc::new(ScriptedProvider::failing("p3", "c")),
        ]);

        let err = orch.reason(&code_request()).await.unwrap_err();
        let names: Vec<_> = err.failures().iter().map(|f| f.provider.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_skipped_silently() {
        let p1 = Arc::new(ScriptedProvider::answering("p1", "unused").unconfigured());
        let p2 = Arc::new(ScriptedProvider::answering("p2", "plan"));
        let orch = orchestrator(vec![p1.clone(), p2.clone()]);

        let request = InferenceRequest::new(InferenceMode::Plan, "agent_a", "DEX");
        let result = orch.reason(&request).await.unwrap();
        assert_eq!(result.narrative(), "plan");
        assert!(result.failures.is_empty());
        assert_eq!(p1.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_moves_provider_first() {
        let p1 = Arc::new(ScriptedProvider::answering("p1", "from p1"));
        let p2 = Arc::new(ScriptedProvider::answering("p2", "from p2"));
        let orch = orchestrator(vec![p1.clone(), p2.clone()]);

        let request = InferenceRequest::new(InferenceMode::Reflect, "agent_a", "DEX")
            .with_provider(Some("p2".into()));
        let result = orch.reason(&request).await.unwrap();
        assert_eq!(result.provider.as_deref(), Some("p2"));
        assert_eq!(p1.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_is_skipped_without_retry() {
        let p1 = Arc::new(ScriptedProvider::new("p1").with_fallback(ScriptedReply::RateLimited));
        let p2 = Arc::new(ScriptedProvider::answering("p2", "I ACCEPT"));
        let orch = orchestrator(vec![p1.clone(), p2.clone()]);

        let request = InferenceRequest::new(InferenceMode::EvaluateInfection, "agent_b", "NFT");
        let result = orch.reason(&request).await.unwrap();
        assert_eq!(p1.calls(), 1);
        assert_eq!(result.fallback_decision.unwrap().kind, DecisionKind::Accept);
        assert!(matches!(
            result.failures[0].error,
            ProviderError::RateLimited { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggers_fallback() {
        let p1 = Arc::new(ScriptedProvider::new("slow").with_fallback(ScriptedReply::Hang));
        let p2 = Arc::new(ScriptedProvider::answering("fast", "ok"));
        let orch = orchestrator(vec![p1, p2]).with_timeout(Duration::from_secs(5));

        let result = orch.reason(&code_request()).await.unwrap();
        assert_eq!(result.provider.as_deref(), Some("fast"));
        assert!(matches!(result.failures[0].error, ProviderError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_reason_uses_same_chain() {
        let p1 = Arc::new(ScriptedProvider::failing("p1", "down"));
        let p2 = Arc::new(ScriptedProvider::answering("p2", "raw answer"));
        let orch = orchestrator(vec![p1, p2.clone()]);

        let text = orch
            .raw_reason("hello", "be brief", None, Some(0.1), Some(64))
            .await
            .unwrap();
        assert_eq!(text, "raw answer");
        let received = p2.received();
        assert_eq!(received[0].max_tokens, 64);
        assert_eq!(received[0].system_prompt, "be brief");
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_count_outcomes() {
        let metrics = OrchestratorMetrics::new().unwrap();
        let orch = orchestrator(vec![
            Arc::new(ScriptedProvider::failing("p1", "down")),
            Arc::new(ScriptedProvider::answering("p2", "ok")),
        ])
        .with_metrics(metrics.clone());

        orch.reason(&code_request()).await.unwrap();
        assert_eq!(metrics.fallbacks.get(), 1);
        assert_eq!(metrics.provider_calls.with_label_values(&["p2", "ok"]).get(), 1);
        assert_eq!(metrics.provider_calls.with_label_values(&["p1", "transport"]).get(), 1);
        assert_eq!(metrics.exhausted.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_override_stays_with_its_provider() {
        let p1 = Arc::new(ScriptedProvider::failing("p1", "down"));
        let p2 = Arc::new(ScriptedProvider::answering("p2", "ok"));
        let orch = orchestrator(vec![p1.clone(), p2.clone()]);

        let request = InferenceRequest::new(InferenceMode::Plan, "agent_c", "Lending")
            .with_provider(Some("p1".into()))
            .with_model(Some("m1".into()));
        let result = orch.reason(&request).await.unwrap();

        assert_eq!(result.provider.as_deref(), Some("p2"));
        assert_eq!(p1.received()[0].model.as_deref(), Some("m1"));
        assert_eq!(p2.received()[0].model, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_override_without_provider_goes_to_first_configured() {
        let p0 = Arc::new(ScriptedProvider::answering("p0", "never").unconfigured());
        let p1 = Arc::new(ScriptedProvider::failing("p1", "down"));
        let p2 = Arc::new(ScriptedProvider::answering("p2", "ok"));
        let orch = orchestrator(vec![p0.clone(), p1.clone(), p2.clone()]);

        let request = InferenceRequest::new(InferenceMode::Plan, "agent_c", "Lending").with_model(Some("m1".into()));
        orch.reason(&request).await.unwrap();

        assert_eq!(p0.calls(), 0);
        assert_eq!(p1.received()[0].model.as_deref(), Some("m1"));
        assert_eq!(p2.received()[0].model, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_override_for_missing_provider_is_dropped() {
        let p1 = Arc::new(ScriptedProvider::answering("p1", "ok"));
        let orch = orchestrator(vec![p1.clone()]);

        let request = InferenceRequest::new(InferenceMode::Plan, "agent_c", "Lending")
            .with_provider(Some("deepseek".into()))
            .with_model(Some("deepseek-chat".into()));
        orch.reason(&request).await.unwrap();

        assert_eq!(p1.received()[0].model, None);
    }
}
