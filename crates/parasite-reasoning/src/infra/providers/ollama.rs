//! Local Ollama daemon

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{status_error, InferenceProvider, ProviderCall};
use crate::config::OllamaSettings;
use crate::error::ProviderError;

pub struct OllamaProvider {
    url: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: String,
}

impl OllamaProvider {
    pub fn new(settings: &OllamaSettings, client: reqwest::Client) -> Self {
        Self {
            url: settings.url.clone().filter(|u| !u.trim().is_empty()),
            model: settings.model.clone(),
            client,
        }
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    async fn call(&self, request: &ProviderCall) -> Result<String, ProviderError> {
        let base = self.url.as_deref().ok_or(ProviderError::Unavailable)?;
        let url = format!("{}/api/chat", base.trim_end_matches('/'));

        let body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "stream": false,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "options": {
                "num_predict": request.max_tokens,
                "temperature": request.temperature,
            },
        });

        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .message
            .map(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::Decode("empty message".to_string()))
    }
}
