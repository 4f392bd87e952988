#![allow(dead_code)]

use hindsight::engine::{EngineOptions, MemoryEngine};
use tempfile::TempDir;

/// Build an engine rooted in a fresh temp directory. The `TempDir` must stay
/// alive for as long as the engine is used.
pub async fn test_engine() -> (TempDir, MemoryEngine) {
    test_engine_with(EngineOptions::default()).await
}

/// Build an engine with explicit options.
pub async fn test_engine_with(options: EngineOptions) -> (TempDir, MemoryEngine) {
    let dir = TempDir::new().unwrap();
    let engine = MemoryEngine::initialize(dir.path(), "default", options).await;
    (dir, engine)
}

/// Record an exchange and return the conversation ID.
pub async fn record(
    engine: &MemoryEngine,
    question: &str,
    answer: &str,
    session: Option<&str>,
) -> String {
    let outcome = engine.record(question, answer, session, None).await;
    assert!(outcome.recorded, "record failed: {:?}", outcome.error);
    outcome.conversation_id.unwrap()
}

/// Find the on-disk path of a conversation file by walking the date shards.
pub fn conversation_file(root: &std::path::Path, id: &str) -> Option<std::path::PathBuf> {
    let shards = std::fs::read_dir(root.join("default").join("conversations")).ok()?;
    for shard in shards.flatten() {
        let candidate = shard.path().join(format!("conv-{id}.md"));
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}
