//! Third-party chat provider
//!
//! Sends the flattened transcript to a chat endpoint and, if that call
//! fails for any reason, retries once against the plain completion
//! endpoint. Responses from either endpoint are read with a fixed list of
//! extractors; the first non-empty string wins.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{DEFAULT_THIRD_PARTY_URL, EndpointConfig};
use crate::error::Result;
use crate::history::{ChatMessage, to_transcript};
use crate::provider::types::{GenerationSettings, ProviderFailure};
use crate::provider::{ChatProvider, base_url, build_client, model_name};

const DEFAULT_THIRD_PARTY_MODEL: &str = "command";

type Extractor = fn(&Value) -> Option<&str>;

fn top_level_text(body: &Value) -> Option<&str> {
    body.get("text").and_then(Value::as_str)
}

fn first_generation(body: &Value) -> Option<&str> {
    body.pointer("/generations/0/text").and_then(Value::as_str)
}

fn message_content(body: &Value) -> Option<&str> {
    body.pointer("/message/content/0/text").and_then(Value::as_str)
}

fn output_text(body: &Value) -> Option<&str> {
    body.get("output_text").and_then(Value::as_str)
}

fn reply(body: &Value) -> Option<&str> {
    body.get("reply").and_then(Value::as_str)
}

/// Tried in order against every response body
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("text", top_level_text),
    ("generations", first_generation),
    ("message.content", message_content),
    ("output_text", output_text),
    ("reply", reply),
];

fn extract_text(body: &Value) -> Option<String> {
    EXTRACTORS.iter().find_map(|(name, extract)| {
        let text = extract(body)?.trim();
        if text.is_empty() {
            return None;
        }
        debug!(extractor = *name, "Extracted third-party response text");
        Some(text.to_string())
    })
}

#[derive(Debug)]
pub struct ThirdPartyChatProvider {
    client: Client,
    base: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    settings: GenerationSettings,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    message: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

impl ThirdPartyChatProvider {
    pub fn new(
        endpoint: &EndpointConfig,
        settings: GenerationSettings,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base: base_url(endpoint, DEFAULT_THIRD_PARTY_URL)?,
            model: model_name(endpoint, DEFAULT_THIRD_PARTY_MODEL),
            api_key: endpoint.api_key(),
            api_key_env: endpoint.api_key_env.clone().unwrap_or_default(),
            settings,
        })
    }

    async fn call<T: Serialize + Sync>(
        &self,
        route: &str,
        api_key: &str,
        payload: &T,
    ) -> std::result::Result<String, String> {
        let url = format!("{}/{route}", self.base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{route} returned {status}"));
        }

        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        extract_text(&body).ok_or_else(|| format!("{route} response contained no text"))
    }
}

#[async_trait]
impl ChatProvider for ThirdPartyChatProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> std::result::Result<String, ProviderFailure> {
        let Some(api_key) = &self.api_key else {
            return Err(ProviderFailure::missing_credential(format!(
                "environment variable '{}' is not set",
                self.api_key_env
            )));
        };

        let transcript = to_transcript(system_prompt, history, question);

        let chat = ChatRequest {
            model: &self.model,
            message: &transcript,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let chat_error = match self.call("chat", api_key, &chat).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        warn!(error = %chat_error, "Third-party chat call failed, trying generate");

        let generate = GenerateRequest {
            model: &self.model,
            prompt: &transcript,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        self.call("generate", api_key, &generate)
            .await
            .map_err(|generate_error| {
                ProviderFailure::transport(format!("{chat_error}; {generate_error}"))
            })
    }

    fn name(&self) -> &'static str {
        "third_party"
    }
}
