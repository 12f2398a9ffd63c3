//! LLM provider abstraction
//!
//! One capability, [`ChatProvider::generate`], implemented per backend. The
//! active backend is chosen once at startup by [`build_provider`] from
//! [`ProviderConfig::kind`] and is never re-evaluated per request.

mod hosted;
mod openai;
#[cfg(feature = "third-party-chat")]
mod third_party;
pub mod types;

pub use hosted::HostedInferenceProvider;
pub use openai::OpenAiProvider;
#[cfg(feature = "third-party-chat")]
pub use third_party::ThirdPartyChatProvider;
pub use types::{Answer, FailureKind, GenerationSettings, ProviderFailure};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::config::{EndpointConfig, ProviderConfig, ProviderKind};
use crate::error::{CourtsideError, Result};
use crate::history::ChatMessage;

/// Trait for text-generation backends
///
/// Implementations translate the normalized (system prompt, history,
/// question) triple into their own wire format and back into plain text.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generate an answer to `question` given prior turns (oldest first)
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> std::result::Result<String, ProviderFailure>;

    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Like [`generate`](Self::generate), but failures become fallback text
    async fn answer(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> Answer {
        match self.generate(system_prompt, history, question).await {
            Ok(text) => Answer::generated(text),
            Err(failure) => {
                warn!(
                    provider = self.name(),
                    failure_kind = %failure.kind,
                    detail = %failure.detail,
                    "Provider call failed"
                );
                Answer::fallback(failure)
            }
        }
    }
}

/// Build the configured provider
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
    let endpoint = config.active_endpoint();
    let settings = GenerationSettings::from(config);
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    let provider: Arc<dyn ChatProvider> = match config.kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::cloud(&endpoint, settings, timeout)?),
        ProviderKind::Local => Arc::new(OpenAiProvider::local(&endpoint, settings, timeout)?),
        ProviderKind::Hosted => {
            Arc::new(HostedInferenceProvider::new(&endpoint, settings, timeout)?)
        }
        #[cfg(feature = "third-party-chat")]
        ProviderKind::ThirdParty => {
            Arc::new(ThirdPartyChatProvider::new(&endpoint, settings, timeout)?)
        }
        #[cfg(not(feature = "third-party-chat"))]
        ProviderKind::ThirdParty => {
            return Err(CourtsideError::Config(
                "Provider 'third_party' requires the `third-party-chat` feature".to_string(),
            ));
        }
    };

    info!(
        provider = provider.name(),
        model = endpoint.model.as_deref().unwrap_or_default(),
        "LLM provider selected"
    );
    Ok(provider)
}

/// HTTP client with a bounded per-request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CourtsideError::Provider(format!("Failed to create HTTP client: {e}")))
}

/// Validated base URL without a trailing slash
pub(crate) fn base_url(endpoint: &EndpointConfig, fallback: &str) -> Result<String> {
    let raw = endpoint
        .api_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(fallback);

    Url::parse(raw)
        .map_err(|e| CourtsideError::Config(format!("Invalid provider URL '{raw}': {e}")))?;

    Ok(raw.trim_end_matches('/').to_string())
}

pub(crate) fn model_name(endpoint: &EndpointConfig, fallback: &str) -> String {
    endpoint
        .model
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_provider_for_each_kind() {
        let mut config = ProviderConfig::default();

        config.kind = ProviderKind::Openai;
        assert_eq!(build_provider(&config).unwrap().name(), "openai");

        config.kind = ProviderKind::Local;
        assert_eq!(build_provider(&config).unwrap().name(), "local");

        config.kind = ProviderKind::Hosted;
        assert_eq!(build_provider(&config).unwrap().name(), "hosted");
    }

    #[cfg(feature = "third-party-chat")]
    #[test]
    fn test_build_third_party_provider() {
        let config = ProviderConfig {
            kind: ProviderKind::ThirdParty,
            ..ProviderConfig::default()
        };
        assert_eq!(build_provider(&config).unwrap().name(), "third_party");
    }

    #[test]
    fn test_build_provider_rejects_invalid_url() {
        let mut config = ProviderConfig::default();
        config.openai.api_url = Some("not a url".to_string());

        let err = build_provider(&config).err().unwrap().to_string();
        assert!(err.contains("Invalid provider URL"));
    }

    #[test]
    fn test_base_url_trims_and_falls_back() {
        let endpoint = EndpointConfig {
            api_url: Some("http://localhost:8080/v1/".to_string()),
            ..EndpointConfig::default()
        };
        assert_eq!(
            base_url(&endpoint, "http://unused").unwrap(),
            "http://localhost:8080/v1"
        );

        let empty = EndpointConfig {
            api_url: Some("  ".to_string()),
            ..EndpointConfig::default()
        };
        assert_eq!(
            base_url(&empty, "http://localhost:1234/v1").unwrap(),
            "http://localhost:1234/v1"
        );
    }
}
