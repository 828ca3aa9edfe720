//! # indexer-engine
//!
//! Background indexing engine.
//!
//! Repeatedly runs a pluggable [`Indexer`] against the index writer, persists
//! its progress as an opaque checkpoint in the same commit as the documents,
//! and exposes start / stop / reindex / delay / checkpoint controls.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use indexer_engine::{from_fn, IndexerService};
//! use indexer_search::{default_schema, SearchIndex};
//! use indexer_types::DelayPolicy;
//!
//! let index = Arc::new(SearchIndex::create_in_ram(default_schema()).unwrap());
//! let routine = from_fn("noop", |writer| {
//!     writer.check_cancelled()?;
//!     Ok(())
//! });
//! let engine = IndexerService::new(index, routine, DelayPolicy::default());
//! engine.start().unwrap();
//! engine.stop();
//! ```

pub mod error;
pub mod indexer;
pub mod service;
pub mod writer;

pub use error::{EngineError, IndexError};
pub use indexer::{from_fn, FnIndexer, Indexer};
pub use service::{IndexerService, PassSummary};
pub use writer::{PassStats, PassWriter};
