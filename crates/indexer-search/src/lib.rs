//! # indexer-search
//!
//! Tantivy-backed storage for the search indexer.
//!
//! ## Features
//! - Single writer per index, handed out one pass at a time
//! - Commit payload carrying generation, checkpoint and properties
//! - Immutable, generation-tagged snapshots published after each commit
//! - Filters with per-generation caching

pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod schema;
pub mod snapshot;
pub mod writer;

pub use document::{build_document, SourceRecord};
pub use error::SearchError;
pub use filter::{CachingFilter, Filter, FilterBits, QueryFilter};
pub use index::{SearchIndex, SearchIndexConfig, DEFAULT_FILTER_CACHE_CAPACITY};
pub use schema::{default_schema, IndexSchema, DEFAULT_KEY_FIELD};
pub use snapshot::{GenerationKey, IndexSnapshot};
pub use writer::StagingWriter;

// Re-exported so routines can build documents without a direct dependency
pub use tantivy;
