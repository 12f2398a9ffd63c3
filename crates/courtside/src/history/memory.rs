//! In-process history store
//!
//! Used for tests and for ephemeral deployments (`storage.backend = "memory"`).
//! Contents are lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::Result;
use crate::history::store::HistoryStore;
use crate::history::types::Exchange;
use crate::identity::Identity;

#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    exchanges: DashMap<Identity, Vec<Exchange>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of exchanges stored for an identity
    pub fn count(&self, identity: &Identity) -> usize {
        self.exchanges.get(identity).map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn list_recent(&self, identity: &Identity, limit: usize) -> Result<Vec<Exchange>> {
        let Some(entries) = self.exchanges.get(identity) else {
            return Ok(Vec::new());
        };

        let mut recent = entries.value().clone();
        drop(entries);

        recent.sort_by_key(|e| e.created_at);
        let skip = recent.len().saturating_sub(limit);
        Ok(recent.split_off(skip))
    }

    async fn append(
        &self,
        identity: &Identity,
        question: &str,
        answer: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Exchange> {
        let exchange = Exchange::new(question.to_string(), answer.to_string(), timestamp);
        self.exchanges
            .entry(identity.clone())
            .or_default()
            .push(exchange.clone());
        Ok(exchange)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
