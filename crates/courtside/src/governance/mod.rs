//! Request governance applied before every provider call
//!
//! - Rate limiting: sliding-window cap per identity key
//! - Moderation: optional external classifier, fail-open

pub mod moderation;
pub mod rate_limit;

pub use moderation::{MODERATION_BLOCK_REASON, ModerationGate, ModerationVerdict};
pub use rate_limit::RateLimiter;
