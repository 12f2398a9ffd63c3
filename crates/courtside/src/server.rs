//! HTTP API
//!
//! - `POST /chat` - answer a question, persist the exchange
//! - `GET /history` - the caller's most recent exchanges, newest first
//! - `GET /api/health` - liveness check
//!
//! Callers are identified by the `courtside_session` cookie; a fresh identity
//! is issued (and the cookie set) when it is missing or invalid. The
//! rate-limit source is the peer address unless `trust_forwarded_for` is set.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{CourtsideError, Result};
use crate::history::{Exchange, HistoryStore};
use crate::identity::Identity;
use crate::orchestrator::{Caller, Rejection, ResponseOrchestrator};

/// Cookie carrying the caller identity
pub const SESSION_COOKIE: &str = "courtside_session";

/// Response header reporting the caller's remaining request allowance
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Shared application state for all handlers
pub struct AppState {
    pub orchestrator: Arc<ResponseOrchestrator>,
    pub store: Arc<dyn HistoryStore>,
    /// Exchanges returned by `GET /history`
    pub history_page_size: usize,
    /// Honor `X-Forwarded-For` when deriving the rate-limit source
    pub trust_forwarded_for: bool,
}

pub struct ChatServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ChatServer {
    pub fn new(
        config: ServerConfig,
        orchestrator: Arc<ResponseOrchestrator>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        let state = Arc::new(AppState {
            orchestrator,
            store,
            history_page_size: config.history_page_size,
            trust_forwarded_for: config.trust_forwarded_for,
        });
        Self { config, state }
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| CourtsideError::Config(format!("Invalid listen address: {e}")))?;

        let app = create_router(self.state.clone());

        tracing::info!(
            provider = self.state.orchestrator.provider_name(),
            store = self.state.store.name(),
            "Starting chat server on {addr}"
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CourtsideError::Server(format!("Failed to bind to {addr}: {e}")))?;

        if self.config.trust_forwarded_for {
            tracing::warn!("Trusting X-Forwarded-For for rate limiting");
        }

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CourtsideError::Server(format!("Server error: {e}")))?;

        tracing::info!("Chat server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/history", get(history_handler))
        .route("/api/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    question: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    answer: String,
    chat_id: Uuid,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    chat_id: Uuid,
    question: String,
    answer: String,
    timestamp: String,
}

impl From<Exchange> for HistoryEntry {
    fn from(exchange: Exchange) -> Self {
        Self {
            chat_id: exchange.chat_id,
            question: exchange.question,
            answer: exchange.answer,
            timestamp: format_timestamp(exchange.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (identity, issued) = resolve_identity(&headers);
    let source = request_source(&headers, peer, state.trust_forwarded_for);
    let caller = Caller::new(identity.clone()).with_source(source);

    // Unparseable bodies are treated as an empty question
    let request: ChatRequest = serde_json::from_slice(&body).unwrap_or_default();

    let result = state
        .orchestrator
        .handle_and_record(&caller, &request.question, state.store.as_ref())
        .await;

    let mut response = match result {
        Ok((answer, exchange)) => {
            let (chat_id, created_at) = exchange
                .map(|e| (e.chat_id, e.created_at))
                .unwrap_or_else(|| (Uuid::new_v4(), Utc::now()));

            Json(ChatResponse {
                answer: answer.text,
                chat_id,
                timestamp: format_timestamp(created_at),
            })
            .into_response()
        }
        Err(rejection) => rejection_response(&rejection),
    };

    let remaining = state
        .orchestrator
        .rate_limiter()
        .remaining(&caller.rate_key());
    response.headers_mut().insert(
        RATE_LIMIT_REMAINING_HEADER,
        HeaderValue::from(remaining),
    );

    with_session_cookie(response, &identity, issued)
}

async fn history_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (identity, issued) = resolve_identity(&headers);

    let response = match state
        .store
        .list_recent(&identity, state.history_page_size)
        .await
    {
        Ok(exchanges) => {
            let history = exchanges.into_iter().rev().map(HistoryEntry::from).collect();
            Json(HistoryResponse { history }).into_response()
        }
        Err(e) => {
            tracing::error!(identity = %identity, error = %e, "Failed to load history");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Der Verlauf konnte nicht geladen werden.",
            )
        }
    };

    with_session_cookie(response, &identity, issued)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": format_timestamp(Utc::now()),
    }))
}

fn rejection_response(rejection: &Rejection) -> Response {
    let status =
        StatusCode::from_u16(rejection.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    error_response(status, rejection.user_message())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Identity from the session cookie, or a fresh one (second value `true`)
fn resolve_identity(headers: &HeaderMap) -> (Identity, bool) {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Identity::try_from(value).ok())
        .map(|identity| (identity, false))
        .unwrap_or_else(|| (Identity::generate(), true))
}

/// Peer IP, or the first `X-Forwarded-For` hop when the proxy is trusted
fn request_source(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match forwarded {
        Some(hop) => hop.to_string(),
        None => peer.ip().to_string(),
    }
}

fn with_session_cookie(mut response: Response, identity: &Identity, issued: bool) -> Response {
    if issued {
        let cookie = format!("{SESSION_COOKIE}={identity}; Path=/; HttpOnly; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!("Failed to build session cookie: {e}"),
        }
    }
    response
}

fn format_timestamp(ts: chrono::DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
