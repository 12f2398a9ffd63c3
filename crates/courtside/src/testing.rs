//! Test utilities - scripted providers and stores
//!
//! Used by unit and integration tests to exercise orchestration and the
//! HTTP surface without network access.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CourtsideError, Result};
use crate::history::{ChatMessage, Exchange, HistoryStore};
use crate::identity::Identity;
use crate::provider::{ChatProvider, ProviderFailure};

/// Arguments of one provider call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub question: String,
}

/// Provider that returns a fixed outcome and records what it was asked
#[derive(Debug)]
pub struct StaticProvider {
    outcome: std::result::Result<String, ProviderFailure>,
    calls: AtomicUsize,
    last: Mutex<Option<RecordedRequest>>,
}

impl StaticProvider {
    pub fn answering(text: impl Into<String>) -> Self {
        Self::with_outcome(Ok(text.into()))
    }

    pub fn failing(failure: ProviderFailure) -> Self {
        Self::with_outcome(Err(failure))
    }

    fn with_outcome(outcome: std::result::Result<String, ProviderFailure>) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatProvider for StaticProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> std::result::Result<String, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(RecordedRequest {
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            question: question.to_string(),
        });
        self.outcome.clone()
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// History store whose every operation fails
#[derive(Debug, Default)]
pub struct FailingHistoryStore;

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn list_recent(&self, _identity: &Identity, _limit: usize) -> Result<Vec<Exchange>> {
        Err(CourtsideError::Storage("history unavailable".to_string()))
    }

    async fn append(
        &self,
        _identity: &Identity,
        _question: &str,
        _answer: &str,
        _timestamp: DateTime<Utc>,
    ) -> Result<Exchange> {
        Err(CourtsideError::Storage("history unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_records_requests() {
        let provider = StaticProvider::answering("ok");
        assert_eq!(provider.calls(), 0);
        assert!(provider.last_request().is_none());

        let history = vec![ChatMessage::user("q"), ChatMessage::assistant("a")];
        let text = provider.generate("sys", &history, "next").await.unwrap();

        assert_eq!(text, "ok");
        assert_eq!(provider.calls(), 1);
        let last = provider.last_request().unwrap();
        assert_eq!(last.history, history);
        assert_eq!(last.question, "next");
    }

    #[tokio::test]
    async fn failing_store_fails() {
        let store = FailingHistoryStore;
        let id = Identity::generate();
        assert!(store.list_recent(&id, 5).await.is_err());
        assert!(store.append(&id, "q", "a", Utc::now()).await.is_err());
    }
}
