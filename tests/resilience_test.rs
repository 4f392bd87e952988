mod helpers;

use helpers::{conversation_file, record, test_engine};
use hindsight::engine::{EngineOptions, MemoryEngine};
use hindsight::storage::ConversationStore;
use tempfile::TempDir;

#[tokio::test]
async fn initialize_creates_missing_layout() {
    let dir = TempDir::new().unwrap();
    let engine =
        MemoryEngine::initialize(dir.path(), "default", EngineOptions::default()).await;

    assert!(engine.is_enabled());
    assert!(dir.path().join("default").join("index.md").exists());
    assert!(dir.path().join("default").join("conversations").is_dir());
}

#[tokio::test]
async fn corrupt_index_degrades_to_empty_and_recovers_on_write() {
    let (dir, engine) = test_engine().await;
    record(
        &engine,
        "How do I implement JWT authentication in my API?",
        "Issue a signed token at login and verify it on every request.",
        None,
    )
    .await;
    drop(engine);

    let index_path = dir.path().join("default").join("index.md");
    std::fs::write(&index_path, "%% not an index at all %%").unwrap();

    let engine =
        MemoryEngine::initialize(dir.path(), "default", EngineOptions::default()).await;
    assert!(engine.is_enabled());
    assert_eq!(engine.stats().await.total_conversations, 0);
    assert!(engine.search("jwt", 10).await.is_empty());

    // The next record rebuilds a valid index file.
    record(&engine, "How do I profile a slow query?", "Use EXPLAIN ANALYZE first.", None).await;
    assert_eq!(engine.stats().await.total_conversations, 1);
    let text = std::fs::read_to_string(&index_path).unwrap();
    assert!(text.contains("# Memory Index"));
}

#[tokio::test]
async fn corrupt_conversation_body_is_skipped_not_fatal() {
    let (dir, engine) = test_engine().await;
    let id = record(
        &engine,
        "How do I implement JWT authentication in my API?",
        "Issue a signed token at login and verify it on every request.",
        None,
    )
    .await;

    let file = conversation_file(dir.path(), &id).unwrap();
    std::fs::write(file, "@@ damaged beyond recognition @@").unwrap();

    assert!(engine.conversation(&id).await.is_none());

    // The index still matches, but the unreadable body drops the result.
    let outcome = engine
        .relevant_context("What is the best way to handle JWT token expiry?", None, None)
        .await;
    assert!(!outcome.context_used);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("matched conversations could not be read")
    );
}

#[tokio::test]
async fn partially_damaged_conversation_keeps_good_exchanges() {
    let dir = TempDir::new().unwrap();
    let store = ConversationStore::new(dir.path(), "default");
    store.ensure_layout().await.unwrap();

    let rel_path = "conversations/2026-08-25/conv-feed0001.md";
    let text = "\
# Conversation conv-feed0001

format: 1
id: feed0001
created: 2026-08-25T09:30:00Z
updated: 2026-08-25T09:31:00Z
keywords: [jwt, token]
topics: [security]

## Exchange 1

_2026-08-25T09:30:00Z_

How do I verify a JWT?

**Answer:**

Check the signature against the issuer key.

---

## Exchange 2

a section with no timestamp or answer marker
";
    let full = dir.path().join("default").join(rel_path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(&full, text).unwrap();

    let loaded = store.load_conversation_at(rel_path).await.unwrap();
    assert_eq!(loaded.exchanges.len(), 1);
    assert_eq!(loaded.exchanges[0].question, "How do I verify a JWT?");
}

#[tokio::test]
async fn missing_session_binding_falls_back_to_new_conversation() {
    let (dir, engine) = test_engine().await;
    let first = record(
        &engine,
        "How do I set up a Postgres database migration?",
        "Use a migration tool and version every schema change.",
        Some("session-1"),
    )
    .await;
    drop(engine);

    // Lose the sidecar; the recent-list fallback still finds the session.
    std::fs::remove_file(dir.path().join("default").join("sessions.md")).unwrap();
    let engine =
        MemoryEngine::initialize(dir.path(), "default", EngineOptions::default()).await;
    let outcome = engine
        .record(
            "Can I roll a migration back?",
            "Write a down step for each migration and test it.",
            Some("session-1"),
            None,
        )
        .await;
    assert_eq!(outcome.conversation_id.as_deref(), Some(first.as_str()));
    assert_eq!(outcome.new_conversation, Some(false));

    // An unknown session starts fresh instead of failing.
    let outcome = engine
        .record(
            "What is a good Docker deploy flow?",
            "Build, tag, push, roll out.",
            Some("session-never-seen"),
            None,
        )
        .await;
    assert!(outcome.recorded);
    assert_eq!(outcome.new_conversation, Some(true));
}
