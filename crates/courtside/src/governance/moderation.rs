//! Moderation pre-check
//!
//! Classifies user text through an OpenAI-compatible `/moderations`
//! endpoint. The gate fails open: when it is disabled, has no credential, or
//! the classifier cannot be reached, text is let through.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ModerationConfig;
use crate::error::{CourtsideError, Result};

/// Reason reported when the classifier flags a text
pub const MODERATION_BLOCK_REASON: &str =
    "Ihre Nachricht verstößt gegen unsere Inhaltsrichtlinien.";

/// Outcome of a moderation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub blocked: bool,
    pub reason: String,
}

impl ModerationVerdict {
    pub fn allowed() -> Self {
        Self {
            blocked: false,
            reason: String::new(),
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
}

#[derive(Debug)]
struct Classifier {
    client: Client,
    url: String,
    api_key: String,
}

/// Optional moderation gate
#[derive(Debug)]
pub struct ModerationGate {
    classifier: Option<Classifier>,
}

impl ModerationGate {
    /// A gate that lets every text through
    pub fn disabled() -> Self {
        Self { classifier: None }
    }

    /// Build the gate from configuration
    ///
    /// A disabled gate or a missing credential is not an error: the gate is
    /// simply inactive.
    pub fn from_config(config: &ModerationConfig) -> Result<Self> {
        if !config.enabled {
            debug!("Moderation disabled");
            return Ok(Self::disabled());
        }

        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!(
                    "Moderation enabled but '{}' is not set; moderation is inactive",
                    config.api_key_env
                );
                return Ok(Self::disabled());
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CourtsideError::Provider(format!("Failed to create HTTP client: {e}")))?;

        let url = format!("{}/moderations", config.api_url.trim_end_matches('/'));
        info!("Moderation enabled via {}", url);

        Ok(Self {
            classifier: Some(Classifier {
                client,
                url,
                api_key,
            }),
        })
    }

    pub fn is_active(&self) -> bool {
        self.classifier.is_some()
    }

    /// Classify a text; never fails
    pub async fn classify(&self, text: &str) -> ModerationVerdict {
        let Some(classifier) = &self.classifier else {
            return ModerationVerdict::allowed();
        };

        match classifier.flagged(text).await {
            Ok(true) => ModerationVerdict::blocked(MODERATION_BLOCK_REASON),
            Ok(false) => ModerationVerdict::allowed(),
            Err(e) => {
                warn!(error = %e, "Moderation check failed, allowing request");
                ModerationVerdict::allowed()
            }
        }
    }
}

impl Classifier {
    async fn flagged(&self, text: &str) -> std::result::Result<bool, String> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ModerationRequest { input: text })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("moderation API returned {status}"));
        }

        let body: ModerationResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.results.iter().any(|r| r.flagged))
    }
}
