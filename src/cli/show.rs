//! CLI `show` command — display full details for a single conversation.

use anyhow::Result;

use crate::config::MemoryConfig;
use crate::storage::format_ts;

/// Show one conversation by ID, with every recorded exchange.
pub async fn show(config: &MemoryConfig, instance: Option<&str>, id: &str) -> Result<()> {
    let engine = super::build_engine(config, instance).await;
    let id = id.strip_prefix("conv-").unwrap_or(id);

    let Some(conversation) = engine.conversation(id).await else {
        anyhow::bail!("no conversation found with id conv-{id}");
    };

    println!("Conversation conv-{}", conversation.id);
    println!("{}", "=".repeat(50));
    if let Some(ref session) = conversation.session_id {
        println!("  Session:  {session}");
    }
    println!("  Created:  {}", format_ts(conversation.created));
    println!("  Updated:  {}", format_ts(conversation.updated));
    if !conversation.keywords.is_empty() {
        println!("  Keywords: {}", conversation.keywords.join(", "));
    }
    if !conversation.topics.is_empty() {
        println!("  Topics:   {}", conversation.topics.join(", "));
    }

    for (i, exchange) in conversation.exchanges.iter().enumerate() {
        println!();
        println!("Exchange {} ({})", i + 1, format_ts(exchange.timestamp));
        println!("  Q: {}", exchange.question);
        println!("  A: {}", exchange.answer);
    }

    Ok(())
}
