//! Indexing routine trait.
//!
//! The engine calls the routine once per pass with a [`PassWriter`]. The
//! routine reads the checkpoint, stages document changes, declares the next
//! checkpoint, and polls for cancellation between units of work.

use crate::error::IndexError;
use crate::writer::PassWriter;

/// Pluggable per-pass indexing logic.
pub trait Indexer: Send {
    /// Name of this routine for logging.
    fn name(&self) -> &str;

    /// Run one pass against `writer`.
    ///
    /// Returning `Ok` lets the engine commit whatever was staged. Returning
    /// an error rolls the pass back, except [`IndexError::Interrupted`],
    /// which commits staged work when it is safe to do so.
    fn index(&mut self, writer: &mut PassWriter<'_>) -> Result<(), IndexError>;
}

/// Indexer backed by a closure.
pub struct FnIndexer<F> {
    name: String,
    f: F,
}

/// Wrap a closure as an [`Indexer`].
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnIndexer<F>
where
    F: FnMut(&mut PassWriter<'_>) -> Result<(), IndexError> + Send,
{
    FnIndexer {
        name: name.into(),
        f,
    }
}

impl<F> Indexer for FnIndexer<F>
where
    F: FnMut(&mut PassWriter<'_>) -> Result<(), IndexError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&mut self, writer: &mut PassWriter<'_>) -> Result<(), IndexError> {
        (self.f)(writer)
    }
}

impl<I: Indexer + ?Sized> Indexer for Box<I> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn index(&mut self, writer: &mut PassWriter<'_>) -> Result<(), IndexError> {
        (**self).index(writer)
    }
}
