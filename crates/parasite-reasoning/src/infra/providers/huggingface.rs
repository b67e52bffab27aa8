//! HuggingFace hosted inference

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{status_error, InferenceProvider, ProviderCall};
use crate::config::ProviderSettings;
use crate::error::ProviderError;

const HF_BASE: &str = "https://api-inference.huggingface.co/models";

pub struct HuggingFaceProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Generated {
    generated_text: String,
}

impl HuggingFaceProvider {
    pub fn new(settings: &ProviderSettings, client: reqwest::Client) -> Self {
        Self {
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| HF_BASE.to_string()),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: settings.model.clone(),
            client,
        }
    }
}

#[async_trait]
impl InferenceProvider for HuggingFaceProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call(&self, request: &ProviderCall) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::Unavailable)?;
        let model = request.model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), model);

        // Text generation endpoints take a single prompt
        let prompt = format!("{}\n\n{}", request.system_prompt, request.user_prompt);
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": request.max_tokens,
                "temperature": request.temperature,
                "return_full_text": false,
            },
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: Vec<Generated> = response.json().await?;
        parsed
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| ProviderError::Decode("no generated text".to_string()))
    }
}
