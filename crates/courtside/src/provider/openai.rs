//! Chat-completions provider
//!
//! Serves both the cloud API and local OpenAI-compatible servers (LM Studio,
//! Ollama, vLLM). The wire contract is identical; only the base URL and the
//! credential requirement differ.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DEFAULT_LOCAL_URL, DEFAULT_OPENAI_URL, EndpointConfig};
use crate::error::Result;
use crate::history::ChatMessage;
use crate::provider::types::{GenerationSettings, ProviderFailure, error_detail};
use crate::provider::{ChatProvider, base_url, build_client, model_name};

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    requires_key: bool,
    settings: GenerationSettings,
    name: &'static str,
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Cloud chat API; requests fail with a credential message when no key is set
    pub fn cloud(
        endpoint: &EndpointConfig,
        settings: GenerationSettings,
        timeout: Duration,
    ) -> Result<Self> {
        Self::build(endpoint, DEFAULT_OPENAI_URL, settings, timeout, true, "openai")
    }

    /// Local OpenAI-compatible server; a key is sent only if configured
    pub fn local(
        endpoint: &EndpointConfig,
        settings: GenerationSettings,
        timeout: Duration,
    ) -> Result<Self> {
        Self::build(endpoint, DEFAULT_LOCAL_URL, settings, timeout, false, "local")
    }

    fn build(
        endpoint: &EndpointConfig,
        default_url: &str,
        settings: GenerationSettings,
        timeout: Duration,
        requires_key: bool,
        name: &'static str,
    ) -> Result<Self> {
        let base = base_url(endpoint, default_url)?;

        Ok(Self {
            client: build_client(timeout)?,
            url: format!("{base}/chat/completions"),
            model: model_name(endpoint, "gpt-3.5-turbo"),
            api_key: endpoint.api_key(),
            api_key_env: endpoint.api_key_env.clone().unwrap_or_default(),
            requires_key,
            settings,
            name,
        })
    }

    fn build_messages(
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(question));
        messages
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> std::result::Result<String, ProviderFailure> {
        if self.requires_key && self.api_key.is_none() {
            return Err(ProviderFailure::missing_credential(format!(
                "environment variable '{}' is not set",
                self.api_key_env
            )));
        }

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: Self::build_messages(system_prompt, history, question),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        debug!(
            provider = self.name,
            url = %self.url,
            history_messages = history.len(),
            "Calling chat completions"
        );

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderFailure::transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderFailure::transport(e.to_string()))?;

        match status {
            StatusCode::UNAUTHORIZED => return Err(ProviderFailure::auth(error_detail(&body))),
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(ProviderFailure::quota(error_detail(&body)));
            }
            s if !s.is_success() => {
                return Err(ProviderFailure::transport(format!(
                    "API returned {s}: {}",
                    error_detail(&body)
                )));
            }
            _ => {}
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderFailure::malformed(format!("invalid completion JSON: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProviderFailure::malformed("completion contained no text"))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
