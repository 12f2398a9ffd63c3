//! SQLite-backed history store
//!
//! Two tables: `users` (one row per identity, created lazily on first append)
//! and `chat_history` (one row per exchange). Timestamps are stored as
//! fixed-width RFC 3339 strings so lexical order equals chronological order.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CourtsideError, Result};
use crate::history::store::HistoryStore;
use crate::history::types::Exchange;
use crate::identity::Identity;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL UNIQUE,
    language TEXT NOT NULL DEFAULT 'de',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id TEXT NOT NULL UNIQUE,
    user_id INTEGER NOT NULL REFERENCES users(id),
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_history_user_time
    ON chat_history(user_id, timestamp);
"#;

/// Per-identity summary used by the CLI
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub identity: String,
    pub language: String,
    pub exchange_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CourtsideError::Storage(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| CourtsideError::Storage(format!("Failed to open database: {e}")))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CourtsideError::Storage(format!("Failed to create in-memory database: {e}"))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| CourtsideError::Storage(format!("Failed to initialize schema: {e}")))?;
        debug!("History schema initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CourtsideError::Storage("History database lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CourtsideError::Storage(format!("History task failed: {e}")))?
    }

    /// All known identities with their exchange counts, most recent first
    pub async fn session_summaries(&self) -> Result<Vec<SessionSummary>> {
        self.with_conn(|conn| query_session_summaries(conn)).await
    }
}

fn query_session_summaries(conn: &Connection) -> Result<Vec<SessionSummary>> {
    let mut stmt = conn.prepare(
        r#"SELECT u.user_id, u.language, COUNT(h.id), MAX(h.timestamp)
           FROM users u
           LEFT JOIN chat_history h ON h.user_id = u.id
           GROUP BY u.id
           ORDER BY MAX(h.timestamp) DESC"#,
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(identity, language, count, last)| {
            Ok(SessionSummary {
                identity,
                language,
                exchange_count: usize::try_from(count).unwrap_or(0),
                last_activity: last.as_deref().map(parse_timestamp).transpose()?,
            })
        })
        .collect()
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CourtsideError::Storage(format!("Invalid timestamp '{raw}': {e}")))
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn list_recent(&self, identity: &Identity, limit: usize) -> Result<Vec<Exchange>> {
        let identity = identity.as_str().to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| query_recent(conn, &identity, limit)).await
    }

    async fn append(
        &self,
        identity: &Identity,
        question: &str,
        answer: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Exchange> {
        let exchange = Exchange::new(question.to_string(), answer.to_string(), timestamp);
        let identity = identity.as_str().to_string();
        self.with_conn(move |conn| {
            insert_exchange(conn, &identity, &exchange)?;
            Ok(exchange)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn query_recent(conn: &Connection, identity: &str, limit: i64) -> Result<Vec<Exchange>> {
    let mut stmt = conn.prepare(
        r#"SELECT h.chat_id, h.question, h.answer, h.timestamp
           FROM chat_history h
           JOIN users u ON u.id = h.user_id
           WHERE u.user_id = ?1
           ORDER BY h.timestamp DESC, h.id DESC
           LIMIT ?2"#,
    )?;

    let rows = stmt
        .query_map(params![identity, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut exchanges = rows
        .into_iter()
        .map(|(chat_id, question, answer, timestamp)| {
            Ok(Exchange {
                chat_id: Uuid::parse_str(&chat_id).map_err(|e| {
                    CourtsideError::Storage(format!("Invalid chat id '{chat_id}': {e}"))
                })?,
                question,
                answer,
                created_at: parse_timestamp(&timestamp)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    exchanges.reverse();
    Ok(exchanges)
}

/// Insert one exchange, creating the user row on first contact
fn insert_exchange(conn: &mut Connection, identity: &str, exchange: &Exchange) -> Result<()> {
    let tx = conn.transaction()?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM users WHERE user_id = ?1",
            params![identity],
            |row| row.get(0),
        )
        .optional()?;

    let user_row = match existing {
        Some(id) => id,
        None => {
            tx.execute(
                "INSERT INTO users (user_id, language, created_at) VALUES (?1, 'de', ?2)",
                params![identity, format_timestamp(&Utc::now())],
            )?;
            debug!(identity, "Created user record");
            tx.last_insert_rowid()
        }
    };

    tx.execute(
        r#"INSERT INTO chat_history (chat_id, user_id, question, answer, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        params![
            exchange.chat_id.to_string(),
            user_row,
            exchange.question,
            exchange.answer,
            format_timestamp(&exchange.created_at),
        ],
    )?;
    tx.commit()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn id(s: &str) -> Identity {
        Identity::try_from(s).unwrap()
    }

    #[tokio::test]
    async fn test_append_then_list_recent() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let user = id("u1");

        let saved = store
            .append(&user, "Was hilft bei Zerrungen?", "Kühlen.", Utc::now())
            .await
            .unwrap();
        let recent = store.list_recent(&user, 10).await.unwrap();

        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].chat_id, saved.chat_id);
        assert_eq!(recent[0].question, "Was hilft bei Zerrungen?");
        assert_eq!(recent[0].answer, "Kühlen.");
    }

    #[tokio::test]
    async fn test_list_recent_returns_newest_window_oldest_first() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let user = id("u1");
        let base = Utc::now();

        for i in 0..12 {
            store
                .append(&user, &format!("q{i}"), "a", base + Duration::seconds(i))
                .await
                .unwrap();
        }

        let recent = store.list_recent(&user, 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.first().unwrap().question, "q2");
        assert_eq!(recent.last().unwrap().question, "q11");
        assert!(recent.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_identities_do_not_leak() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store.append(&id("alice"), "secret", "a", Utc::now()).await.unwrap();

        assert!(store.list_recent(&id("bob"), 10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_locked_database_does_not_stall_the_runtime() {
        let store = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let guard = store.conn.lock().unwrap();

        let pending = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.list_recent(&id("u1"), 10).await }
        });

        // Other tasks keep running on the single worker while the query waits
        let ticked = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            true
        });
        assert!(ticked.await.unwrap());
        assert!(!pending.is_finished());

        drop(guard);
        assert!(pending.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_summaries() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let base = Utc::now();
        store.append(&id("alice"), "q", "a", base).await.unwrap();
        store.append(&id("alice"), "q", "a", base + Duration::seconds(1)).await.unwrap();
        store.append(&id("bob"), "q", "a", base + Duration::seconds(5)).await.unwrap();

        let summaries = store.session_summaries().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].identity, "bob");
        assert_eq!(summaries[0].exchange_count, 1);
        assert_eq!(summaries[1].identity, "alice");
        assert_eq!(summaries[1].exchange_count, 2);
        assert_eq!(summaries[1].language, "de");
    }
}
