//! Indexer daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, once, reindex, info, search)
//! - `source`: JSON-lines feed indexing routine

pub mod cli;
pub mod commands;
pub mod source;

pub use cli::{Cli, Commands};
pub use commands::{
    build_engine, index_report, init_logging, load_settings, open_index, reindex, run_indexer,
    run_once, search, Overrides, SearchHit,
};
pub use source::{JsonlSource, LINES_INDEXED_PROPERTY, SOURCE_PROPERTY};
