//! Courtside - sports-injury chat assistant
//!
//! Routes user questions to one configured LLM provider, keeps per-user
//! conversation history and applies rate limiting and moderation before
//! every provider call.

pub mod config;
pub mod error;
pub mod governance;
pub mod history;
pub mod identity;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod server;
pub mod testing;

pub use error::CourtsideError;
pub use orchestrator::{Caller, Rejection, ResponseOrchestrator};
