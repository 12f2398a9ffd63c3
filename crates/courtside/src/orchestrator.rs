//! Response orchestration
//!
//! The single entry point for answering a question. Order of checks:
//! empty input, rate limit, moderation, then history lookup and the
//! provider call. Each early rejection leaves no trace in history and
//! never reaches the provider.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::governance::{ModerationGate, RateLimiter};
use crate::history::{Exchange, HistoryStore, to_message_list};
use crate::identity::Identity;
use crate::prompts;
use crate::provider::{Answer, ChatProvider, build_provider};

/// Message returned for blank questions
pub const EMPTY_QUESTION_MESSAGE: &str = "Bitte geben Sie eine Frage ein.";

/// Message returned when the caller exceeded the rate limit
pub const RATE_LIMITED_MESSAGE: &str =
    "Zu viele Anfragen. Bitte warten Sie einen Moment und versuchen Sie es dann erneut.";

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: Identity,
    /// Network origin, if known (e.g. the client address)
    pub source: Option<String>,
}

impl Caller {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Key the rate limiter counts requests under
    pub fn rate_key(&self) -> String {
        match &self.source {
            Some(source) => format!("{}:{}", self.identity, source),
            None => self.identity.to_string(),
        }
    }
}

/// Why a question was turned away before reaching the provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("empty question")]
    EmptyQuestion,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("blocked by moderation: {reason}")]
    ModerationBlocked { reason: String },
}

impl Rejection {
    /// Text shown to the user
    pub fn user_message(&self) -> &str {
        match self {
            Rejection::EmptyQuestion => EMPTY_QUESTION_MESSAGE,
            Rejection::RateLimited => RATE_LIMITED_MESSAGE,
            Rejection::ModerationBlocked { reason } => reason,
        }
    }

    /// HTTP status the server answers with
    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::EmptyQuestion | Rejection::ModerationBlocked { .. } => 400,
            Rejection::RateLimited => 429,
        }
    }
}

pub struct ResponseOrchestrator {
    provider: Arc<dyn ChatProvider>,
    rate_limiter: Arc<RateLimiter>,
    moderation: Arc<ModerationGate>,
    system_prompt: String,
    history_limit: usize,
}

impl ResponseOrchestrator {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        rate_limiter: Arc<RateLimiter>,
        moderation: Arc<ModerationGate>,
    ) -> Self {
        Self {
            provider,
            rate_limiter,
            moderation,
            system_prompt: prompts::SPORT_INJURY_SYSTEM_PROMPT.to_string(),
            history_limit: 10,
        }
    }

    /// Wire up provider, limiter and moderation gate from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = build_provider(&config.provider)?;
        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let moderation = Arc::new(ModerationGate::from_config(&config.moderation)?);

        Ok(Self::new(provider, rate_limiter, moderation)
            .with_system_prompt(prompts::system_prompt(
                config.assistant.system_prompt.as_deref(),
            ))
            .with_history_limit(config.assistant.history_limit))
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Answer a question on behalf of `caller`
    ///
    /// Returns a [`Rejection`] for empty, rate-limited or flagged questions.
    /// Provider failures are not rejections: they come back as an [`Answer`]
    /// carrying fallback text. Nothing is written to `store`.
    pub async fn handle_question(
        &self,
        caller: &Caller,
        question: &str,
        store: &dyn HistoryStore,
    ) -> std::result::Result<Answer, Rejection> {
        let question = question.trim();
        if question.is_empty() {
            debug!(identity = %caller.identity, "Rejected empty question");
            return Err(Rejection::EmptyQuestion);
        }

        if !self.rate_limiter.check_and_record(&caller.rate_key()) {
            info!(identity = %caller.identity, "Rate limit exceeded");
            return Err(Rejection::RateLimited);
        }

        let verdict = self.moderation.classify(question).await;
        if verdict.blocked {
            info!(identity = %caller.identity, "Question blocked by moderation");
            return Err(Rejection::ModerationBlocked {
                reason: verdict.reason,
            });
        }

        let exchanges = match store.list_recent(&caller.identity, self.history_limit).await {
            Ok(exchanges) => exchanges,
            Err(e) => {
                warn!(
                    identity = %caller.identity,
                    store = store.name(),
                    error = %e,
                    "Failed to load history, answering without context"
                );
                Vec::new()
            }
        };
        let history = to_message_list(&exchanges);

        debug!(
            identity = %caller.identity,
            provider = self.provider.name(),
            history_messages = history.len(),
            "Dispatching question"
        );

        let answer = self
            .provider
            .answer(&self.system_prompt, &history, question)
            .await;

        info!(
            identity = %caller.identity,
            provider = self.provider.name(),
            failure_kind = answer.failure_kind().map(|k| k.as_str()).unwrap_or("none"),
            "Question answered"
        );

        Ok(answer)
    }

    /// [`handle_question`](Self::handle_question), then persist the exchange
    ///
    /// Fallback answers are stored too, so the transcript shows what the
    /// user actually saw. A failed write is logged and yields `None`.
    pub async fn handle_and_record(
        &self,
        caller: &Caller,
        question: &str,
        store: &dyn HistoryStore,
    ) -> std::result::Result<(Answer, Option<Exchange>), Rejection> {
        let answer = self.handle_question(caller, question, store).await?;

        let exchange = match store
            .append(&caller.identity, question.trim(), &answer.text, Utc::now())
            .await
        {
            Ok(exchange) => Some(exchange),
            Err(e) => {
                warn!(
                    identity = %caller.identity,
                    store = store.name(),
                    error = %e,
                    "Failed to persist exchange"
                );
                None
            }
        };

        Ok((answer, exchange))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::provider::FailureKind;
    use crate::testing::{FailingHistoryStore, StaticProvider};
    use std::time::Duration;

    fn orchestrator(provider: Arc<StaticProvider>, max_requests: u32) -> ResponseOrchestrator {
        ResponseOrchestrator::new(
            provider,
            Arc::new(RateLimiter::new(max_requests, Duration::from_secs(60))),
            Arc::new(ModerationGate::disabled()),
        )
        .with_system_prompt("SYS")
    }

    fn caller(id: &str) -> Caller {
        Caller::new(Identity::try_from(id).unwrap())
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected_before_rate_limit() {
        let provider = Arc::new(StaticProvider::answering("x"));
        let orchestrator = orchestrator(provider.clone(), 1);
        let store = MemoryHistoryStore::new();
        let caller = caller("u1");

        for blank in ["", "   ", "\n\t"] {
            assert_eq!(
                orchestrator.handle_question(&caller, blank, &store).await,
                Err(Rejection::EmptyQuestion)
            );
        }

        assert_eq!(orchestrator.rate_limiter().remaining(&caller.rate_key()), 1);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_after_max_requests() {
        let provider = Arc::new(StaticProvider::answering("Kühlen."));
        let orchestrator = orchestrator(provider.clone(), 2);
        let store = MemoryHistoryStore::new();
        let caller = caller("u1");

        assert!(orchestrator.handle_question(&caller, "a", &store).await.is_ok());
        assert!(orchestrator.handle_question(&caller, "b", &store).await.is_ok());
        assert_eq!(
            orchestrator.handle_question(&caller, "c", &store).await,
            Err(Rejection::RateLimited)
        );
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_history_is_passed_oldest_first() {
        let provider = Arc::new(StaticProvider::answering("Antwort"));
        let orchestrator = orchestrator(provider.clone(), 10).with_history_limit(2);
        let store = MemoryHistoryStore::new();
        let caller = caller("u1");
        let base = Utc::now();

        for (i, q) in ["eins", "zwei", "drei"].iter().enumerate() {
            store
                .append(
                    &caller.identity,
                    q,
                    &format!("a-{q}"),
                    base + chrono::Duration::seconds(i as i64),
                )
                .await
                .unwrap();
        }

        orchestrator
            .handle_question(&caller, "vier", &store)
            .await
            .unwrap();

        let seen = provider.last_request().unwrap();
        assert_eq!(seen.system_prompt, "SYS");
        assert_eq!(seen.question, "vier");
        let contents: Vec<&str> = seen.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["zwei", "a-zwei", "drei", "a-drei"]);
    }

    #[tokio::test]
    async fn test_history_failure_proceeds_without_context() {
        let provider = Arc::new(StaticProvider::answering("Trotzdem."));
        let orchestrator = orchestrator(provider.clone(), 10);

        let answer = orchestrator
            .handle_question(&caller("u1"), "Frage", &FailingHistoryStore)
            .await
            .unwrap();

        assert_eq!(answer.text, "Trotzdem.");
        assert!(provider.last_request().unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_an_answer() {
        let provider = Arc::new(StaticProvider::failing(
            crate::provider::ProviderFailure::quota("429"),
        ));
        let orchestrator = orchestrator(provider, 10);
        let store = MemoryHistoryStore::new();

        let answer = orchestrator
            .handle_question(&caller("u1"), "Frage", &store)
            .await
            .unwrap();
        assert_eq!(answer.failure_kind(), Some(FailureKind::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_handle_and_record_persists_trimmed_question() {
        let provider = Arc::new(StaticProvider::answering("Kühlen."));
        let orchestrator = orchestrator(provider, 10);
        let store = MemoryHistoryStore::new();
        let caller = caller("u1");

        let (answer, exchange) = orchestrator
            .handle_and_record(&caller, "  Knie?  ", &store)
            .await
            .unwrap();

        let exchange = exchange.unwrap();
        assert_eq!(exchange.question, "Knie?");
        assert_eq!(exchange.answer, answer.text);
        assert_eq!(store.count(&caller.identity), 1);
    }

    #[tokio::test]
    async fn test_rejections_are_not_recorded() {
        let provider = Arc::new(StaticProvider::answering("x"));
        let orchestrator = orchestrator(provider, 1);
        let store = MemoryHistoryStore::new();
        let caller = caller("u1");

        orchestrator.handle_and_record(&caller, "", &store).await.unwrap_err();
        orchestrator.handle_and_record(&caller, "a", &store).await.unwrap();
        orchestrator.handle_and_record(&caller, "b", &store).await.unwrap_err();

        assert_eq!(store.count(&caller.identity), 1);
    }

    #[test]
    fn test_rate_key_includes_source() {
        let plain = caller("u1");
        assert_eq!(plain.rate_key(), "u1");
        assert_eq!(plain.with_source("10.0.0.1").rate_key(), "u1:10.0.0.1");
    }

    #[test]
    fn test_rejection_messages_and_status() {
        assert_eq!(Rejection::EmptyQuestion.user_message(), EMPTY_QUESTION_MESSAGE);
        assert_eq!(Rejection::EmptyQuestion.status_code(), 400);
        assert_eq!(Rejection::RateLimited.status_code(), 429);

        let blocked = Rejection::ModerationBlocked {
            reason: "nein".to_string(),
        };
        assert_eq!(blocked.user_message(), "nein");
        assert_eq!(blocked.status_code(), 400);
    }
}
