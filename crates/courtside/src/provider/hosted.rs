//! Hosted text-generation provider
//!
//! Talks to an inference endpoint that takes a single flattened prompt
//! instead of a message list. History is rendered with
//! [`to_transcript`](crate::history::to_transcript).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DEFAULT_HOSTED_URL, EndpointConfig};
use crate::error::Result;
use crate::history::{ChatMessage, to_transcript};
use crate::provider::types::{GenerationSettings, ProviderFailure, error_detail};
use crate::provider::{ChatProvider, base_url, build_client, model_name};

const DEFAULT_HOSTED_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";

#[derive(Debug)]
pub struct HostedInferenceProvider {
    client: Client,
    url: String,
    api_key: Option<String>,
    api_key_env: String,
    settings: GenerationSettings,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generated {
    generated_text: String,
}

/// The shapes an inference endpoint answers with
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    List(Vec<Generated>),
    Single(Generated),
    Error { error: String },
}

impl HostedInferenceProvider {
    pub fn new(
        endpoint: &EndpointConfig,
        settings: GenerationSettings,
        timeout: Duration,
    ) -> Result<Self> {
        let base = base_url(endpoint, DEFAULT_HOSTED_URL)?;
        let model = model_name(endpoint, DEFAULT_HOSTED_MODEL);

        Ok(Self {
            client: build_client(timeout)?,
            url: format!("{base}/models/{model}"),
            api_key: endpoint.api_key(),
            api_key_env: endpoint.api_key_env.clone().unwrap_or_default(),
            settings,
        })
    }
}

#[async_trait]
impl ChatProvider for HostedInferenceProvider {
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

        let prompt = to_transcript(system_prompt, history, question);
        let request = InferenceRequest {
            inputs: &prompt,
            parameters: InferenceParameters {
                max_new_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
                return_full_text: false,
            },
        };

        debug!(url = %self.url, prompt_chars = prompt.len(), "Calling hosted inference");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
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
                return Err(ProviderFailure::transport(format!("HTTP {}", s.as_u16())));
            }
            _ => {}
        }

        let parsed: InferenceResponse = serde_json::from_str(&body).map_err(|_| {
            ProviderFailure::malformed(format!(
                "could not interpret response: {}",
                error_detail(&body)
            ))
        })?;

        let text = match parsed {
            InferenceResponse::List(items) => items.into_iter().next().map(|g| g.generated_text),
            InferenceResponse::Single(item) => Some(item.generated_text),
            InferenceResponse::Error { error } => return Err(ProviderFailure::transport(error)),
        };

        text.map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderFailure::malformed("could not interpret response: no text"))
    }

    fn name(&self) -> &'static str {
        "hosted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{FailureKind, MALFORMED_RESPONSE_MESSAGE};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "org/test-model";

    async fn provider_for(server: &MockServer, key_env: &str) -> HostedInferenceProvider {
        unsafe { std::env::set_var(key_env, "hf-key") };
        let endpoint = EndpointConfig {
            api_url: Some(server.uri()),
            model: Some(MODEL.to_string()),
            api_key_env: Some(key_env.to_string()),
        };
        HostedInferenceProvider::new(&endpoint, GenerationSettings::default(), Duration::from_secs(5))
            .unwrap()
    }

    async fn mount(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(format!("/models/{MODEL}")))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_sends_flattened_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{MODEL}")))
            .and(header("Authorization", "Bearer hf-key"))
            .and(body_partial_json(serde_json::json!({
                "inputs": "SYS\n\nHistory:\nUser: Hi\nAssistant: Hallo\n\nUser: Was tun?\nAnswer:",
                "parameters": {"max_new_tokens": 500, "return_full_text": false}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"generated_text": " Kühlen. "}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, "COURTSIDE_TEST_HOSTED_KEY_LIST").await;
        let history = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hallo")];

        let text = provider.generate("SYS", &history, "Was tun?").await.unwrap();
        assert_eq!(text, "Kühlen.");
    }

    #[tokio::test]
    async fn test_accepts_single_object() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"generated_text": "Ruhe."})),
        )
        .await;

        let provider = provider_for(&server, "COURTSIDE_TEST_HOSTED_KEY_OBJ").await;
        assert_eq!(provider.generate("SYS", &[], "Frage").await.unwrap(), "Ruhe.");
    }

    #[tokio::test]
    async fn test_error_object_is_transport_failure() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"error": "Model is currently loading"})),
        )
        .await;

        let provider = provider_for(&server, "COURTSIDE_TEST_HOSTED_KEY_ERR").await;
        let answer = provider.answer("SYS", &[], "Frage").await;
        assert_eq!(answer.failure_kind(), Some(FailureKind::TransportFailure));
        assert!(answer.text.contains("Model is currently loading"));
    }

    #[tokio::test]
    async fn test_unknown_shape_is_malformed() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"unexpected": 42})),
        )
        .await;

        let provider = provider_for(&server, "COURTSIDE_TEST_HOSTED_KEY_ODD").await;
        let answer = provider.answer("SYS", &[], "Frage").await;
        assert_eq!(answer.text, MALFORMED_RESPONSE_MESSAGE);
        assert!(answer.failure.unwrap().detail.contains("could not interpret"));
    }

    #[tokio::test]
    async fn test_status_codes() {
        let server = MockServer::start().await;
        mount(&server, ResponseTemplate::new(503)).await;

        let provider = provider_for(&server, "COURTSIDE_TEST_HOSTED_KEY_503").await;
        let failure = provider.generate("SYS", &[], "Frage").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::TransportFailure);
        assert_eq!(failure.detail, "HTTP 503");

        let server = MockServer::start().await;
        mount(&server, ResponseTemplate::new(401)).await;
        let provider = provider_for(&server, "COURTSIDE_TEST_HOSTED_KEY_401").await;
        let failure = provider.generate("SYS", &[], "Frage").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::AuthFailure);
    }

    #[tokio::test]
    async fn test_missing_key() {
        unsafe { std::env::remove_var("COURTSIDE_TEST_HOSTED_KEY_NONE") };
        let endpoint = EndpointConfig {
            api_key_env: Some("COURTSIDE_TEST_HOSTED_KEY_NONE".to_string()),
            ..EndpointConfig::default()
        };
        let provider = HostedInferenceProvider::new(
            &endpoint,
            GenerationSettings::default(),
            Duration::from_secs(5),
        )
        .unwrap();

        let failure = provider.generate("SYS", &[], "Frage").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::MissingCredential);
        assert!(provider.url.ends_with(&format!("/models/{DEFAULT_HOSTED_MODEL}")));
    }
}
