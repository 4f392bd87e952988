//! CLI `search` command — keyword/topic search over the index.

use anyhow::Result;

use crate::config::MemoryConfig;

/// Run a search from the terminal.
pub async fn search(
    config: &MemoryConfig,
    instance: Option<&str>,
    query: &str,
    limit: Option<usize>,
) -> Result<()> {
    let engine = super::build_engine(config, instance).await;
    let limit = limit.unwrap_or(config.retrieval.max_results);
    let results = engine.search(query, limit).await;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let date = result
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".into());
        match result.score {
            Some(score) => println!(
                "  {}. [{}] conv-{} (score: {:.2})",
                i + 1,
                date,
                result.id,
                score
            ),
            None => println!("  {}. [{}] conv-{}", i + 1, date, result.id),
        }
        println!("     {}", result.summary);
        if !result.keywords.is_empty() {
            println!("     keywords: {}", result.keywords.join(", "));
        }
        println!();
    }

    Ok(())
}
