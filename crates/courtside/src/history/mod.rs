//! Conversation history
//!
//! Stored question/answer exchanges, the store abstraction the orchestrator
//! reads context from, and the formatters that shape that context for the
//! different provider request styles.

pub mod format;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

pub use format::{to_message_list, to_transcript};
pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;
pub use store::HistoryStore;
pub use types::{ChatMessage, Exchange, Role};

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// Open the configured history store
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn HistoryStore>> {
    match config.backend {
        StorageBackend::Sqlite => {
            info!("Using SQLite history at {}", config.database_path.display());
            Ok(Arc::new(SqliteHistoryStore::open(&config.database_path)?))
        }
        StorageBackend::Memory => {
            info!("Using in-memory history; exchanges are lost on restart");
            Ok(Arc::new(MemoryHistoryStore::new()))
        }
    }
}
