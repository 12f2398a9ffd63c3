//! History store abstraction

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::history::types::Exchange;
use crate::identity::Identity;

/// Persistent per-identity conversation history
///
/// Implementations must only ever return exchanges belonging to the
/// requested identity.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Fetch the most recent `limit` exchanges, oldest first
    async fn list_recent(&self, identity: &Identity, limit: usize) -> Result<Vec<Exchange>>;

    /// Append one exchange and return it with its assigned id
    async fn append(
        &self,
        identity: &Identity,
        question: &str,
        answer: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Exchange>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
