//! Provider outcome types
//!
//! Adapters never surface errors to the conversation: every failure becomes
//! an [`Answer`] whose text is a fixed, user-facing explanation, while the
//! typed [`ProviderFailure`] stays available for logging and callers that
//! need to tell failure classes apart.

use std::fmt;

use crate::config::ProviderConfig;

pub const MISSING_CREDENTIAL_MESSAGE: &str = "Der KI-Dienst ist nicht eingerichtet: Es ist kein API-Schlüssel hinterlegt. Bitte wenden Sie sich an den Betreiber dieser Anwendung.";

pub const AUTH_FAILURE_MESSAGE: &str = "Der KI-Dienst hat den API-Schlüssel abgelehnt. Bitte überprüfen Sie den in der Konfiguration hinterlegten Schlüssel.";

pub const QUOTA_EXCEEDED_MESSAGE: &str = "Das Anfragelimit des KI-Dienstes ist erreicht oder das Kontingent ist aufgebraucht. Bitte versuchen Sie es später erneut.";

pub const MALFORMED_RESPONSE_MESSAGE: &str = "Die Antwort des KI-Dienstes konnte nicht interpretiert werden. Bitte versuchen Sie es erneut.";

pub const TECHNICAL_FAILURE_PREFIX: &str =
    "Entschuldigung, es gab einen technischen Fehler bei der Verarbeitung Ihrer Anfrage";

/// Failure classes a provider call can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No API key configured for a provider that needs one
    MissingCredential,
    /// The backend rejected the credential (HTTP 401)
    AuthFailure,
    /// The backend's own rate limit or quota was hit (HTTP 429)
    QuotaExceeded,
    /// The response could not be interpreted
    MalformedResponse,
    /// Connection errors, timeouts and other non-success statuses
    TransportFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MissingCredential => "missing_credential",
            FailureKind::AuthFailure => "auth_failure",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::TransportFailure => "transport_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed provider call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ProviderFailure {
    pub kind: FailureKind,
    /// Diagnostic text (status codes, raw error bodies)
    pub detail: String,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn missing_credential(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::MissingCredential, detail)
    }

    pub fn auth(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::AuthFailure, detail)
    }

    pub fn quota(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::QuotaExceeded, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::TransportFailure, detail)
    }

    /// Text shown to the user in place of an answer
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::MissingCredential => MISSING_CREDENTIAL_MESSAGE.to_string(),
            FailureKind::AuthFailure => AUTH_FAILURE_MESSAGE.to_string(),
            FailureKind::QuotaExceeded => QUOTA_EXCEEDED_MESSAGE.to_string(),
            FailureKind::MalformedResponse => MALFORMED_RESPONSE_MESSAGE.to_string(),
            FailureKind::TransportFailure if self.detail.is_empty() => {
                format!("{TECHNICAL_FAILURE_PREFIX}.")
            }
            FailureKind::TransportFailure => {
                format!("{TECHNICAL_FAILURE_PREFIX}: {}", self.detail)
            }
        }
    }
}

/// What a provider call produced: always displayable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// Set when `text` is a fallback message rather than generated output
    pub failure: Option<ProviderFailure>,
}

impl Answer {
    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            failure: None,
        }
    }

    pub fn fallback(failure: ProviderFailure) -> Self {
        Self {
            text: failure.user_message(),
            failure: Some(failure),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

impl From<Result<String, ProviderFailure>> for Answer {
    fn from(result: Result<String, ProviderFailure>) -> Self {
        match result {
            Ok(text) => Answer::generated(text),
            Err(failure) => Answer::fallback(failure),
        }
    }
}

/// Sampling settings shared by all providers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

impl From<&ProviderConfig> for GenerationSettings {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Pull a readable message out of an error body
///
/// Understands `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": ...}`; otherwise returns the (shortened) raw body.
pub(crate) fn error_detail(body: &str) -> String {
    const MAX_DETAIL_CHARS: usize = 300;

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|e| e.is_string()))
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    body.chars().take(MAX_DETAIL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_messages_per_kind() {
        assert_eq!(
            ProviderFailure::auth("401").user_message(),
            AUTH_FAILURE_MESSAGE
        );
        assert_eq!(
            ProviderFailure::quota("429").user_message(),
            QUOTA_EXCEEDED_MESSAGE
        );
        assert_eq!(
            ProviderFailure::missing_credential("OPENAI_API_KEY").user_message(),
            MISSING_CREDENTIAL_MESSAGE
        );
        assert_eq!(
            ProviderFailure::malformed("no choices").user_message(),
            MALFORMED_RESPONSE_MESSAGE
        );
    }

    #[test]
    fn test_transport_message_carries_detail() {
        let message = ProviderFailure::transport("HTTP 503").user_message();
        assert!(message.starts_with(TECHNICAL_FAILURE_PREFIX));
        assert!(message.ends_with("HTTP 503"));

        let bare = ProviderFailure::transport("").user_message();
        assert_eq!(bare, format!("{TECHNICAL_FAILURE_PREFIX}."));
    }

    #[test]
    fn test_answer_from_result() {
        let ok: Answer = Ok::<_, ProviderFailure>("Kühlen".to_string()).into();
        assert!(!ok.is_fallback());
        assert_eq!(ok.text, "Kühlen");

        let failed: Answer = Err::<String, _>(ProviderFailure::auth("bad key")).into();
        assert!(failed.is_fallback());
        assert_eq!(failed.failure_kind(), Some(FailureKind::AuthFailure));
        assert_eq!(failed.text, AUTH_FAILURE_MESSAGE);
    }

    #[test]
    fn test_error_detail_shapes() {
        assert_eq!(
            error_detail(r#"{"error": {"message": "Incorrect API key", "type": "invalid"}}"#),
            "Incorrect API key"
        );
        assert_eq!(error_detail(r#"{"error": "Model is loading"}"#), "Model is loading");
        assert_eq!(error_detail(r#"{"message": "nope"}"#), "nope");
        assert_eq!(error_detail("plain text"), "plain text");
        assert_eq!(error_detail(&"x".repeat(1000)).len(), 300);
    }

    #[test]
    fn test_failure_display() {
        let failure = ProviderFailure::quota("insufficient_quota");
        assert_eq!(failure.to_string(), "quota_exceeded: insufficient_quota");
    }
}
