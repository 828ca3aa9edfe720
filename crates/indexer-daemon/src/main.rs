//! Search Indexer Daemon
//!
//! Keeps a tantivy index in sync with a JSON-lines feed.
//!
//! # Usage
//!
//! ```bash
//! search-indexer run --source feed.jsonl
//! search-indexer once --source feed.jsonl
//! search-indexer reindex --source feed.jsonl
//! search-indexer info --level detailed
//! search-indexer search "rust ownership" --tag guide
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/search-indexer/config.toml)
//! 3. Environment variables (INDEXER_*)
//! 4. CLI flags

use anyhow::{Context, Result};
use clap::Parser;

use indexer_daemon::{
    index_report, init_logging, load_settings, reindex, run_indexer, run_once, search, Cli,
    Commands, Overrides,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = match &cli.command {
        Commands::Run { source } | Commands::Once { source } | Commands::Reindex { source } => {
            source.clone()
        }
        Commands::Info { .. } | Commands::Search { .. } => None,
    };
    let overrides = Overrides {
        log_level: cli.log_level.clone(),
        index_path: cli.index_path.clone(),
        source,
    };
    let settings = load_settings(cli.config.as_deref(), &overrides)?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Run { .. } => {
            run_indexer(settings).await?;
        }
        Commands::Once { .. } => {
            let summary = run_once(&settings)?;
            println!(
                "{}: generation {} ({} changes, status {})",
                summary.outcome,
                summary.generation,
                summary.stats.total(),
                summary.status
            );
        }
        Commands::Reindex { .. } => {
            let passes = reindex(&settings)?;
            println!("Reindexed in {} passes", passes);
        }
        Commands::Info { level } => {
            let report = index_report(&settings, level)?;
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{}", json);
        }
        Commands::Search { query, tag, limit } => {
            let hits = search(&settings, &query, tag.as_deref(), limit)?;
            if hits.is_empty() {
                println!("No matches");
            }
            for hit in hits {
                println!("{:>8.3}  {}", hit.score, hit.id);
            }
        }
    }

    Ok(())
}
