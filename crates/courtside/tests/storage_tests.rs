//! Integration tests for history persistence

use chrono::{Duration, Utc};

use courtside::config::{StorageBackend, StorageConfig};
use courtside::history::{HistoryStore, SqliteHistoryStore, open_store, to_message_list};
use courtside::identity::Identity;

#[tokio::test]
async fn test_sqlite_history_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("history.db");
    let identity = Identity::try_from("laeufer-7").unwrap();
    let start = Utc::now() - Duration::hours(1);

    {
        let store = SqliteHistoryStore::open(&db_path).unwrap();
        for i in 0..3 {
            store
                .append(
                    &identity,
                    &format!("Frage {i}"),
                    &format!("Antwort {i}"),
                    start + Duration::minutes(i),
                )
                .await
                .unwrap();
        }
    }

    let store = SqliteHistoryStore::open(&db_path).unwrap();
    let recent = store.list_recent(&identity, 2).await.unwrap();
    let questions: Vec<&str> = recent.iter().map(|e| e.question.as_str()).collect();
    assert_eq!(questions, vec!["Frage 1", "Frage 2"]);

    let summaries = store.session_summaries().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].identity, "laeufer-7");
    assert_eq!(summaries[0].language, "de");
    assert_eq!(summaries[0].exchange_count, 3);
}

#[tokio::test]
async fn test_stored_exchanges_format_as_alternating_messages() {
    let store = open_store(&StorageConfig {
        backend: StorageBackend::Memory,
        ..StorageConfig::default()
    })
    .unwrap();
    let identity = Identity::generate();
    let now = Utc::now();

    store
        .append(&identity, "Knie geschwollen", "Kühlen", now - Duration::seconds(2))
        .await
        .unwrap();
    store
        .append(&identity, "Wie lange?", "20 Minuten", now - Duration::seconds(1))
        .await
        .unwrap();

    let messages = to_message_list(&store.list_recent(&identity, 10).await.unwrap());
    let rendered: Vec<String> = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect();
    assert_eq!(
        rendered,
        vec![
            "user: Knie geschwollen",
            "assistant: Kühlen",
            "user: Wie lange?",
            "assistant: 20 Minuten",
        ]
    );
}

#[tokio::test]
async fn test_concurrent_appends_are_all_stored() {
    let store = std::sync::Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let identity = Identity::try_from("parallel").unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = store.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                store
                    .append(&identity, &format!("q{i}"), "a", Utc::now())
                    .await
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.list_recent(&identity, 100).await.unwrap().len(), 20);
}
