//! CLI `record` command — store one question/answer exchange.

use anyhow::{Context, Result};

use crate::config::MemoryConfig;

/// Record an exchange, optionally continuing a session.
pub async fn record(
    config: &MemoryConfig,
    instance: Option<&str>,
    question: &str,
    answer: &str,
    session: Option<&str>,
    metadata: Option<&str>,
) -> Result<()> {
    let metadata: Option<serde_json::Value> = match metadata {
        Some(raw) => Some(serde_json::from_str(raw).context("failed to parse metadata JSON")?),
        None => None,
    };

    let engine = super::build_engine(config, instance).await;
    let outcome = engine
        .record(question, answer, session, metadata.as_ref())
        .await;

    if !outcome.recorded {
        let reason = outcome.error.unwrap_or_else(|| "unknown".into());
        anyhow::bail!("record failed: {reason}");
    }

    let id = outcome.conversation_id.unwrap_or_default();
    let disposition = match outcome.new_conversation {
        Some(false) => "appended to existing conversation",
        _ => "new conversation",
    };
    println!("Recorded conv-{id} ({disposition})");
    if !outcome.keywords.is_empty() {
        println!("  Keywords: {}", outcome.keywords.join(", "));
    }
    if !outcome.topics.is_empty() {
        println!("  Topics:   {}", outcome.topics.join(", "));
    }

    Ok(())
}
