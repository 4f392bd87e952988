//! CLI `context` command — preview the context block retrieval would inject.

use anyhow::Result;

use crate::config::MemoryConfig;

/// Print the context block for a question to stdout; sources go to stderr so
/// the block itself stays pipeable.
pub async fn context(
    config: &MemoryConfig,
    instance: Option<&str>,
    question: &str,
    max_items: Option<usize>,
    max_tokens: Option<usize>,
) -> Result<()> {
    let engine = super::build_engine(config, instance).await;
    let outcome = engine.relevant_context(question, max_items, max_tokens).await;

    if !outcome.context_used {
        let reason = outcome.reason.unwrap_or_else(|| "unknown".into());
        println!("No context would be injected ({reason}).");
        return Ok(());
    }

    if let Some(block) = outcome.context {
        println!("{block}");
    }

    if let Some(summary) = outcome.summary {
        eprintln!("{summary}");
    }
    for source in &outcome.sources {
        eprintln!("  conv-{} (score: {:.2})", source.id, source.score);
    }

    Ok(())
}
