//! CLI `stats` command — aggregate counts for one memory instance.

use anyhow::Result;

use crate::config::MemoryConfig;
use crate::storage::format_ts;

/// Display index statistics in the terminal.
pub async fn stats(config: &MemoryConfig, instance: Option<&str>) -> Result<()> {
    let engine = super::build_engine(config, instance).await;
    let stats = engine.stats().await;

    println!("Memory Statistics ({})", engine.instance());
    println!("{}", "=".repeat(40));
    println!(
        "  Enabled:                {}",
        if engine.is_enabled() { "yes" } else { "no" }
    );
    println!("  Conversations recorded: {}", stats.total_conversations);
    println!("  Topics indexed:         {}", stats.total_topics);
    println!("  Keywords indexed:       {}", stats.total_keywords);
    if let Some(updated) = stats.last_updated {
        println!("  Last updated:           {}", format_ts(updated));
    }

    Ok(())
}
