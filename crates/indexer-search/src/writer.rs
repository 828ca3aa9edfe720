//! Exclusive, pass-scoped access to the single index writer.
//!
//! Staged mutations are invisible to readers until `SearchIndex::commit`.
//! A `StagingWriter` dropped without commit or rollback discards its work.

use std::sync::MutexGuard;

use tantivy::{IndexWriter, TantivyDocument, Term};
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::schema::IndexSchema;

/// Writer guard handed out by `SearchIndex::writer`.
pub struct StagingWriter<'a> {
    guard: MutexGuard<'a, IndexWriter>,
    schema: &'a IndexSchema,
    staged: usize,
    finished: bool,
}

impl<'a> StagingWriter<'a> {
    pub(crate) fn new(guard: MutexGuard<'a, IndexWriter>, schema: &'a IndexSchema) -> Self {
        Self {
            guard,
            schema,
            staged: 0,
            finished: false,
        }
    }

    pub fn schema(&self) -> &IndexSchema {
        self.schema
    }

    /// Stage a new document.
    pub fn add(&mut self, doc: TantivyDocument) -> Result<(), SearchError> {
        self.guard.add_document(doc)?;
        self.staged += 1;
        Ok(())
    }

    /// Replace every document with `key` by `doc`.
    pub fn update(&mut self, key: &str, doc: TantivyDocument) -> Result<(), SearchError> {
        let term = Term::from_field_text(self.schema.key, key);
        self.guard.delete_term(term);
        self.guard.add_document(doc)?;
        self.staged += 1;
        debug!(key, "Staged update");
        Ok(())
    }

    /// Stage deletion of every document with `key`.
    pub fn delete(&mut self, key: &str) {
        let term = Term::from_field_text(self.schema.key, key);
        self.guard.delete_term(term);
        self.staged += 1;
        debug!(key, "Staged delete");
    }

    /// Number of mutations staged since the writer was acquired.
    pub fn staged(&self) -> usize {
        self.staged
    }

    pub fn has_staged(&self) -> bool {
        self.staged > 0
    }

    /// Discard everything staged.
    pub fn rollback(mut self) -> Result<(), SearchError> {
        self.discard()
    }

    /// Prepare and commit with `payload` attached. Rolls back on failure.
    pub(crate) fn commit_with(&mut self, payload: &str) -> Result<u64, SearchError> {
        self.finished = true;
        let result = self.guard.prepare_commit().and_then(|mut prepared| {
            prepared.set_payload(payload);
            prepared.commit()
        });

        match result {
            Ok(opstamp) => {
                self.staged = 0;
                Ok(opstamp)
            }
            Err(e) => {
                if let Err(rollback_err) = self.guard.rollback() {
                    warn!(error = %rollback_err, "Rollback after failed commit also failed");
                }
                Err(e.into())
            }
        }
    }

    fn discard(&mut self) -> Result<(), SearchError> {
        self.finished = true;
        let staged = self.staged;
        self.staged = 0;
        let opstamp = self.guard.rollback()?;
        warn!(opstamp, staged, "Rolled back index changes");
        Ok(())
    }
}

impl Drop for StagingWriter<'_> {
    fn drop(&mut self) {
        if !self.finished && self.staged > 0 {
            if let Err(e) = self.discard() {
                warn!(error = %e, "Failed to discard abandoned changes");
            }
        }
    }
}
