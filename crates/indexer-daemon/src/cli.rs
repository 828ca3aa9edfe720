//! CLI argument parsing for the indexer daemon.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

use indexer_types::ReportLevel;

/// Incremental search indexer
///
/// Keeps a tantivy index in sync with a JSON-lines feed.
#[derive(Parser, Debug)]
#[command(name = "search-indexer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/search-indexer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override index directory
    #[arg(long, global = true)]
    pub index_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the indexing loop until Ctrl+C
    Run {
        /// JSON-lines feed to index
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Run a single indexing pass and exit
    Once {
        /// JSON-lines feed to index
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Print the index report as JSON
    Info {
        /// Report detail: basic, normal or detailed
        #[arg(long, default_value = "normal")]
        level: ReportLevel,
    },

    /// Forget the checkpoint and rebuild from the start of the feed
    Reindex {
        /// JSON-lines feed to index
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Query the index
    Search {
        /// Query string over document bodies
        query: String,

        /// Only return documents carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}
