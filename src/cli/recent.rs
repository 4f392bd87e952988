//! CLI `recent` command — list the most recent conversations.

use anyhow::Result;

use crate::config::MemoryConfig;

/// List recent conversations, newest first.
pub async fn recent(
    config: &MemoryConfig,
    instance: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let engine = super::build_engine(config, instance).await;
    let limit = limit.unwrap_or(config.retrieval.max_results);
    let results = engine.recent(limit).await;

    if results.is_empty() {
        println!("No conversations recorded yet.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let date = result
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".into());
        println!("  {}. [{}] conv-{}", i + 1, date, result.id);
        println!("     {}", result.summary);
        if !result.keywords.is_empty() {
            println!("     keywords: {}", result.keywords.join(", "));
        }
        println!();
    }

    Ok(())
}
