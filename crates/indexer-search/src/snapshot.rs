//! Published point-in-time views of the index.
//!
//! A snapshot pairs a tantivy `Searcher` with the [`IndexInfo`] of the commit
//! it was opened on. Snapshots are immutable; a commit publishes a new one and
//! readers holding the old `Arc` keep a consistent view until they drop it.

use tantivy::collector::TopDocs;
use tantivy::query::Query;
use tantivy::schema::{Field, Value};
use tantivy::{DocAddress, Searcher, TantivyDocument};

use indexer_types::IndexInfo;

use crate::error::SearchError;
use crate::filter::FilterBits;

/// Identifies the reader generation a computation was made against.
///
/// `index` distinguishes `SearchIndex` instances within the process so two
/// indexes at the same generation never share cached state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationKey {
    pub index: u64,
    pub generation: u64,
}

/// Searcher opened on one committed generation.
#[derive(Clone)]
pub struct IndexSnapshot {
    key: GenerationKey,
    info: IndexInfo,
    searcher: Searcher,
}

impl IndexSnapshot {
    pub(crate) fn new(index: u64, info: IndexInfo, searcher: Searcher) -> Self {
        Self {
            key: GenerationKey {
                index,
                generation: info.generation,
            },
            info,
            searcher,
        }
    }

    pub fn key(&self) -> GenerationKey {
        self.key
    }

    /// Generation this snapshot was opened on.
    pub fn generation(&self) -> u64 {
        self.key.generation
    }

    /// Info recorded by the commit this snapshot observes.
    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }

    /// Run a scored query, best matches first.
    pub fn search(
        &self,
        query: &dyn Query,
        limit: usize,
    ) -> Result<Vec<(f32, DocAddress)>, SearchError> {
        let top_docs = self.searcher.search(query, &TopDocs::with_limit(limit))?;
        Ok(top_docs)
    }

    /// Stored string value of `field` for one document.
    pub fn stored_text(
        &self,
        address: DocAddress,
        field: Field,
    ) -> Result<Option<String>, SearchError> {
        let doc: TantivyDocument = self.searcher.doc(address)?;
        Ok(doc
            .get_first(field)
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    /// Stored key values of every document in `bits`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::GenerationMismatch` if `bits` was computed
    /// against another generation; doc addresses are not stable across
    /// generations.
    pub fn stored_keys(&self, bits: &FilterBits, key: Field) -> Result<Vec<String>, SearchError> {
        if bits.generation() != self.key {
            return Err(SearchError::GenerationMismatch {
                expected: self.key.generation,
                actual: bits.generation().generation,
            });
        }

        let mut keys = Vec::with_capacity(bits.len());
        for address in bits.iter() {
            if let Some(value) = self.stored_text(address, key)? {
                keys.push(value);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("key", &self.key)
            .field("num_docs", &self.searcher.num_docs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::build_document;
    use crate::index::SearchIndex;
    use crate::schema::default_schema;
    use tantivy::query::QueryParser;

    fn populated_index() -> SearchIndex {
        let index = SearchIndex::create_in_ram(default_schema()).unwrap();
        let schema = index.schema().clone();
        let mut writer = index.writer().unwrap();
        writer
            .add(build_document(&schema, "a", "rust borrow checker", &[]).unwrap())
            .unwrap();
        writer
            .add(build_document(&schema, "b", "tantivy segments", &[]).unwrap())
            .unwrap();
        let info = index.info().next_generation(None, Default::default());
        index.commit(writer, &info).unwrap();
        index
    }

    #[test]
    fn test_initial_snapshot_is_empty() {
        let index = SearchIndex::create_in_ram(default_schema()).unwrap();
        let snapshot = index.snapshot();
        assert_eq!(snapshot.generation(), 0);
        assert_eq!(snapshot.num_docs(), 0);
        assert!(snapshot.info().is_initial());
    }

    #[test]
    fn test_search_and_stored_text() {
        let index = populated_index();
        let snapshot = index.snapshot();
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.num_docs(), 2);

        let body = index.schema().field("body").unwrap();
        let parser = QueryParser::for_index(index.index(), vec![body]);
        let query = parser.parse_query("borrow").unwrap();
        let hits = snapshot.search(query.as_ref(), 10).unwrap();
        assert_eq!(hits.len(), 1);

        let id = snapshot.stored_text(hits[0].1, index.schema().key).unwrap();
        assert_eq!(id.as_deref(), Some("a"));
    }

    #[test]
    fn test_old_snapshot_survives_commit() {
        let index = populated_index();
        let before = index.snapshot();

        let mut writer = index.writer().unwrap();
        writer.delete("a");
        let info = index.info().next_generation(None, Default::default());
        index.commit(writer, &info).unwrap();

        assert_eq!(before.num_docs(), 2);
        assert_eq!(index.snapshot().num_docs(), 1);
        assert_eq!(index.snapshot().generation(), before.generation() + 1);
    }
}
