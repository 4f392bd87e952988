mod analysis;
mod cli;
mod config;
mod engine;
mod retrieval;
mod storage;
mod types;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hindsight",
    version,
    about = "Conversation memory for AI assistants"
)]
struct Cli {
    /// Memory instance to operate on (defaults to the configured one)
    #[arg(long, global = true)]
    instance: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a question/answer exchange
    Record {
        /// The user's question
        question: String,
        /// The assistant's answer
        answer: String,
        /// Session ID; exchanges sharing it land in one conversation
        #[arg(long)]
        session: Option<String>,
        /// Optional metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Search past conversations by keyword and topic
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List the most recent conversations
    Recent {
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Display one conversation in full
    Show {
        /// Conversation ID, with or without the conv- prefix
        id: String,
    },
    /// Show index statistics
    Stats,
    /// Preview the context block retrieved for a question
    Context {
        question: String,
        /// Maximum conversations to include
        #[arg(long)]
        max_items: Option<usize>,
        /// Token budget for the block
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::MemoryConfig::load()?;

    // Initialize tracing with the configured log level.
    // Log to stderr so stdout stays clean for piped output.
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let instance = cli.instance.as_deref();
    match cli.command {
        Command::Record {
            question,
            answer,
            session,
            metadata,
        } => {
            cli::record::record(
                &config,
                instance,
                &question,
                &answer,
                session.as_deref(),
                metadata.as_deref(),
            )
            .await?;
        }
        Command::Search { query, limit } => {
            cli::search::search(&config, instance, &query, limit).await?;
        }
        Command::Recent { limit } => {
            cli::recent::recent(&config, instance, limit).await?;
        }
        Command::Show { id } => {
            cli::show::show(&config, instance, &id).await?;
        }
        Command::Stats => {
            cli::stats::stats(&config, instance).await?;
        }
        Command::Context {
            question,
            max_items,
            max_tokens,
        } => {
            cli::context::context(&config, instance, &question, max_items, max_tokens).await?;
        }
    }

    Ok(())
}
