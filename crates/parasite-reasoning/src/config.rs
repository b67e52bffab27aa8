//! Reasoning configuration
//!
//! Defaults are overridden from the environment after loading `.env`.
//! Unparsable values are ignored and the default is kept.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infra::retry::RetryPolicy;

/// Credentials and model for one hosted backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key; provider is skipped when absent
    pub api_key: Option<String>,
    /// Model identifier sent with each request
    pub model: String,
    /// Endpoint override
    pub base_url: Option<String>,
}

impl ProviderSettings {
    fn hosted(model: &str) -> Self {
        Self {
            api_key: None,
            model: model.to_string(),
            base_url: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().map_or(false, |k| !k.trim().is_empty())
    }
}

/// Local Ollama daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    /// Base URL; provider is skipped when absent
    pub url: Option<String>,
    pub model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            url: None,
            model: "llama3.3:70b".to_string(),
        }
    }
}

/// Rate limiter settings (per provider key)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_calls: usize,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_calls: 30,
            window_secs: 60,
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_factor,
        )
    }
}

/// Full reasoning layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub groq: ProviderSettings,
    pub openrouter: ProviderSettings,
    pub deepseek: ProviderSettings,
    pub gemini: ProviderSettings,
    pub huggingface: ProviderSettings,
    pub ollama: OllamaSettings,
    /// Process-wide preferred provider (moved to the front of the ranking)
    pub preferred_provider: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    /// Per provider call deadline
    pub provider_timeout_secs: u64,
    /// Trailing characters of the artifact sent as code context
    pub code_context_chars: usize,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            groq: ProviderSettings::hosted("llama-3.3-70b-versatile"),
            openrouter: ProviderSettings::hosted("meta-llama/llama-3.2-90b-vision-instruct:free"),
            deepseek: ProviderSettings::hosted("deepseek-chat"),
            gemini: ProviderSettings::hosted("gemini-flash-lite-latest"),
            huggingface: ProviderSettings::hosted("mistralai/Mistral-7B-Instruct-v0.3"),
            ollama: OllamaSettings::default(),
            preferred_provider: None,
            max_tokens: 1024,
            temperature: 0.7,
            rate_limit: RateLimitSettings::default(),
            retry: RetrySettings::default(),
            provider_timeout_secs: 30,
            code_context_chars: 6000,
        }
    }
}

impl ReasoningConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        load_provider(&mut cfg.groq, "GROQ");
        load_provider(&mut cfg.openrouter, "OPENROUTER");
        load_provider(&mut cfg.deepseek, "DEEPSEEK");
        load_provider(&mut cfg.gemini, "GEMINI");
        load_provider(&mut cfg.huggingface, "HUGGINGFACE");

        if let Some(url) = non_empty("OLLAMA_URL") {
            cfg.ollama.url = Some(url);
        }
        if let Some(model) = non_empty("OLLAMA_MODEL") {
            cfg.ollama.model = model;
        }

        if let Some(provider) = non_empty("LLM_PROVIDER") {
            cfg.preferred_provider = Some(provider.to_ascii_lowercase());
        }
        parse_into("LLM_MAX_TOKENS", &mut cfg.max_tokens);
        parse_into("LLM_TEMPERATURE", &mut cfg.temperature);

        parse_into("PARASITE_RATE_LIMIT_CALLS", &mut cfg.rate_limit.max_calls);
        parse_into("PARASITE_RATE_LIMIT_WINDOW_SECS", &mut cfg.rate_limit.window_secs);

        parse_into("PARASITE_RETRY_ATTEMPTS", &mut cfg.retry.max_attempts);
        parse_into("PARASITE_RETRY_BASE_DELAY_MS", &mut cfg.retry.base_delay_ms);
        parse_into("PARASITE_RETRY_BACKOFF", &mut cfg.retry.backoff_factor);

        parse_into("PARASITE_PROVIDER_TIMEOUT_SECS", &mut cfg.provider_timeout_secs);
        parse_into("PARASITE_CODE_CONTEXT_CHARS", &mut cfg.code_context_chars);

        Ok(cfg)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_secs)
    }
}

fn load_provider(settings: &mut ProviderSettings, prefix: &str) {
    if let Some(key) = non_empty(&format!("{prefix}_API_KEY")) {
        settings.api_key = Some(key);
    }
    if let Some(model) = non_empty(&format!("{prefix}_MODEL")) {
        settings.model = model;
    }
    if let Some(url) = non_empty(&format!("{prefix}_API_URL")) {
        settings.base_url = Some(url);
    }
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_into<T: std::str::FromStr>(var: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(var) {
        if let Ok(v) = val.trim().parse() {
            *slot = v;
        }
    }
}
