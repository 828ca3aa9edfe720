//! Writer facade handed to the indexing routine for one pass.

use std::collections::BTreeMap;

use indexer_search::{IndexSchema, SearchError, StagingWriter};
use indexer_types::Checkpoint;
use tantivy::TantivyDocument;
use tokio_util::sync::CancellationToken;

use crate::error::IndexError;

/// Counts of staged mutations in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Mutation calls that returned an error
    pub failed: u64,
}

impl PassStats {
    pub fn total(&self) -> u64 {
        self.added + self.updated + self.deleted
    }
}

/// Mutable view of the index for the duration of one pass.
///
/// Nothing staged here is visible to readers until the engine commits the
/// pass. A failed mutation marks the pass unsafe: an interrupted unsafe pass
/// is rolled back instead of committed.
pub struct PassWriter<'a> {
    staging: StagingWriter<'a>,
    start_checkpoint: Option<Checkpoint>,
    checkpoint: Option<Checkpoint>,
    properties: BTreeMap<String, String>,
    token: CancellationToken,
    document_count: u64,
    stats: PassStats,
}

/// What a finished pass wants committed.
pub(crate) struct PassResult {
    pub checkpoint: Option<Checkpoint>,
    pub properties: BTreeMap<String, String>,
    pub stats: PassStats,
}

impl<'a> PassWriter<'a> {
    pub(crate) fn new(
        staging: StagingWriter<'a>,
        checkpoint: Option<Checkpoint>,
        properties: BTreeMap<String, String>,
        token: CancellationToken,
        document_count: u64,
    ) -> Self {
        Self {
            staging,
            start_checkpoint: checkpoint.clone(),
            checkpoint,
            properties,
            token,
            document_count,
            stats: PassStats::default(),
        }
    }

    /// Checkpoint this pass started from.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.start_checkpoint.as_ref()
    }

    /// Checkpoint that will be persisted if the pass completes.
    pub fn pending_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    pub fn schema(&self) -> &IndexSchema {
        self.staging.schema()
    }

    /// Live documents at pass start.
    pub fn document_count(&self) -> u64 {
        self.document_count
    }

    /// Stage a new document.
    pub fn add(&mut self, doc: TantivyDocument) -> Result<(), IndexError> {
        let result = self.staging.add(doc);
        self.record(result, |stats| stats.added += 1)
    }

    /// Stage replacement of the document with `key`.
    pub fn update(&mut self, key: &str, doc: TantivyDocument) -> Result<(), IndexError> {
        self.check_key(key)?;
        let result = self.staging.update(key, doc);
        self.record(result, |stats| stats.updated += 1)
    }

    /// Stage deletion of the document with `key`.
    pub fn delete(&mut self, key: &str) -> Result<(), IndexError> {
        self.check_key(key)?;
        self.staging.delete(key);
        self.stats.deleted += 1;
        Ok(())
    }

    /// Persist `value` as the checkpoint if the pass completes.
    pub fn set_checkpoint(&mut self, value: impl Into<String>) -> Result<(), IndexError> {
        self.checkpoint = Some(Checkpoint::new(value)?);
        Ok(())
    }

    /// Persist an absent checkpoint if the pass completes.
    pub fn clear_checkpoint(&mut self) {
        self.checkpoint = None;
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn clear_properties(&mut self) {
        self.properties.clear();
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// True once a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(Interrupted)` once a stop has been requested.
    pub fn check_cancelled(&self) -> Result<(), IndexError> {
        if self.token.is_cancelled() {
            Err(IndexError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// False once any mutation call has failed.
    pub fn is_safe(&self) -> bool {
        self.stats.failed == 0
    }

    pub(crate) fn has_staged(&self) -> bool {
        self.staging.has_staged()
    }

    pub(crate) fn into_parts(self) -> (StagingWriter<'a>, PassResult) {
        let result = PassResult {
            checkpoint: self.checkpoint,
            properties: self.properties,
            stats: self.stats,
        };
        (self.staging, result)
    }

    /// An empty key matches no document; count it as a failed mutation.
    fn check_key(&mut self, key: &str) -> Result<(), IndexError> {
        if key.is_empty() {
            self.stats.failed += 1;
            return Err(IndexError::InvalidArgument(
                "document key is empty".to_string(),
            ));
        }
        Ok(())
    }

    fn record(
        &mut self,
        result: Result<(), SearchError>,
        count: impl FnOnce(&mut PassStats),
    ) -> Result<(), IndexError> {
        match result {
            Ok(()) => {
                count(&mut self.stats);
                Ok(())
            }
            Err(e) => {
                self.stats.failed += 1;
                Err(e.into())
            }
        }
    }
}
