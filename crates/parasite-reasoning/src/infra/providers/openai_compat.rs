//! OpenAI-compatible chat completions (Groq, OpenRouter, DeepSeek)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{status_error, InferenceProvider, ProviderCall};
use crate::config::ProviderSettings;
use crate::error::ProviderError;

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEEPSEEK_URL: &str = "https://api.deepseek.com/v1/chat/completions";

pub struct OpenAiCompatProvider {
    name: &'static str,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: &'static str,
        default_endpoint: &str,
        settings: &ProviderSettings,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name,
            endpoint: settings
                .base_url
                .clone()
                .unwrap_or_else(|| default_endpoint.to_string()),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: settings.model.clone(),
            client,
        }
    }

    pub fn groq(settings: &ProviderSettings, client: reqwest::Client) -> Self {
        Self::new("groq", GROQ_URL, settings, client)
    }

    pub fn openrouter(settings: &ProviderSettings, client: reqwest::Client) -> Self {
        Self::new("openrouter", OPENROUTER_URL, settings, client)
    }

    pub fn deepseek(settings: &ProviderSettings, client: reqwest::Client) -> Self {
        Self::new("deepseek", DEEPSEEK_URL, settings, client)
    }
}

#[async_trait]
impl InferenceProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call(&self, request: &ProviderCall) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::Unavailable)?;
        let body = ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Decode("no choices in completion".to_string()))
    }
}
