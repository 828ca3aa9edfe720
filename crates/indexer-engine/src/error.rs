//! Error types for indexing passes and the control surface.

use indexer_search::SearchError;
use indexer_types::{IndexStatus, TypesError};
use tantivy::TantivyError;
use thiserror::Error;

/// Failure of one indexing pass.
///
/// Returned by indexing routines and by the commit path. [`IndexError::kind`]
/// maps each failure onto the status reported to callers.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The pass observed a cancellation request
    #[error("Pass interrupted")]
    Interrupted,

    /// Transient storage failure
    #[error("IO error: {0}")]
    Io(String),

    /// Index data is damaged
    #[error("Index corrupt: {0}")]
    Corrupt(String),

    /// Index could not be acquired
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Routine produced an invalid value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Error from the search index
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Routine panicked
    #[error("Indexing routine panicked: {0}")]
    Panicked(String),
}

impl IndexError {
    /// Status a pass failing with this error leaves behind.
    pub fn kind(&self) -> IndexStatus {
        match self {
            IndexError::Interrupted => IndexStatus::Interrupted,
            IndexError::Io(_) | IndexError::InvalidArgument(_) => IndexStatus::IoError,
            IndexError::Corrupt(_) | IndexError::Panicked(_) => IndexStatus::Corrupt,
            IndexError::Unavailable(_) => IndexStatus::Unavailable,
            IndexError::Search(e) => search_kind(e),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, IndexError::Interrupted)
    }
}

fn search_kind(err: &SearchError) -> IndexStatus {
    match err {
        SearchError::Tantivy(e) => tantivy_kind(e),
        SearchError::SchemaMismatch(_)
        | SearchError::Serialization(_)
        | SearchError::GenerationMismatch { .. } => IndexStatus::Corrupt,
        SearchError::IndexLocked(_) => IndexStatus::Unavailable,
        SearchError::Io(_) | SearchError::QueryParse(_) => IndexStatus::IoError,
    }
}

fn tantivy_kind(err: &TantivyError) -> IndexStatus {
    match err {
        TantivyError::DataCorruption(_)
        | TantivyError::IncompatibleIndex(_)
        | TantivyError::SchemaError(_) => IndexStatus::Corrupt,
        TantivyError::LockFailure(..) | TantivyError::Poisoned => IndexStatus::Unavailable,
        _ => IndexStatus::IoError,
    }
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Io(err.to_string())
    }
}

impl From<TantivyError> for IndexError {
    fn from(err: TantivyError) -> Self {
        IndexError::Search(SearchError::Tantivy(err))
    }
}

impl From<TypesError> for IndexError {
    fn from(err: TypesError) -> Self {
        IndexError::InvalidArgument(err.to_string())
    }
}

/// Errors returned by engine control operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected input (negative delay, empty checkpoint)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation needs a stopped engine
    #[error("Engine is already running")]
    AlreadyRunning,

    /// Background thread could not be spawned
    #[error("Failed to spawn indexing thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Error from the search index
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

impl From<TypesError> for EngineError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::InvalidArgument(msg) => EngineError::InvalidArgument(msg),
            other => EngineError::InvalidArgument(other.to_string()),
        }
    }
}
