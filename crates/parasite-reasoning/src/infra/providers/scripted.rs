//! Scripted provider for offline runs and tests
//!
//! Replies are taken, in order, from: a one-shot queue, the first rule whose
//! needle appears in the prompt, then the fallback.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{InferenceProvider, ProviderCall};
use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    RateLimited,
    Fail(String),
    /// Never resolves before the orchestrator's deadline
    Hang,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }
}

pub struct ScriptedProvider {
    name: String,
    configured: bool,
    queue: Mutex<VecDeque<ScriptedReply>>,
    rules: Vec<(String, ScriptedReply)>,
    fallback: ScriptedReply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configured: true,
            queue: Mutex::new(VecDeque::new()),
            rules: Vec::new(),
            fallback: ScriptedReply::Fail("no scripted reply".to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Provider that always fails with `message`
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name).with_fallback(ScriptedReply::Fail(message.into()))
    }

    /// Provider that always returns `text`
    pub fn answering(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_fallback(ScriptedReply::text(text))
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Reply with `reply` whenever `needle` appears in either prompt
    pub fn with_rule(mut self, needle: impl Into<String>, reply: ScriptedReply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    /// Queue a reply consumed by the next call
    pub fn push(&self, reply: ScriptedReply) {
        self.queue.lock().push_back(reply);
    }

    /// Number of calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order
    pub fn received(&self) -> Vec<ProviderCall> {
        self.prompts.lock().clone()
    }

    fn next_reply(&self, request: &ProviderCall) -> ScriptedReply {
        if let Some(reply) = self.queue.lock().pop_front() {
            return reply;
        }
        self.rules
            .iter()
            .find(|(needle, _)| {
                request.system_prompt.contains(needle.as_str())
                    || request.user_prompt.contains(needle.as_str())
            })
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn call(&self, request: &ProviderCall) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.clone());

        match self.next_reply(request) {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::RateLimited => Err(ProviderError::RateLimited { retry_after: None }),
            ScriptedReply::Fail(message) => Err(ProviderError::Transport(message)),
            ScriptedReply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(ProviderError::Timeout(Duration::from_secs(24 * 60 * 60)))
            }
        }
    }
}
