//! Document filters evaluated against a snapshot.
//!
//! A filter yields the set of matching documents as one bitset per segment.
//! Doc addresses are only meaningful within the generation they were
//! computed on, so every [`FilterBits`] carries its [`GenerationKey`].

mod caching;

pub use caching::CachingFilter;

use std::sync::Arc;

use bit_vec::BitVec;
use tantivy::collector::DocSetCollector;
use tantivy::query::{Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::{DocAddress, Term};

use crate::error::SearchError;
use crate::snapshot::{GenerationKey, IndexSnapshot};

/// A reusable document filter.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Matching documents of `snapshot`.
    fn bits(&self, snapshot: &IndexSnapshot) -> Result<Arc<FilterBits>, SearchError>;
}

/// Matching documents of one generation, one bitset per segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBits {
    generation: GenerationKey,
    segments: Vec<BitVec>,
    count: usize,
}

impl FilterBits {
    /// Collect `addresses` into bitsets sized to the snapshot's segments.
    ///
    /// Addresses outside the snapshot's segments are ignored.
    pub fn from_addresses(
        snapshot: &IndexSnapshot,
        addresses: impl IntoIterator<Item = DocAddress>,
    ) -> Self {
        let mut segments: Vec<BitVec> = snapshot
            .searcher()
            .segment_readers()
            .iter()
            .map(|reader| BitVec::from_elem(reader.max_doc() as usize, false))
            .collect();

        let mut count = 0;
        for address in addresses {
            let Some(bits) = segments.get_mut(address.segment_ord as usize) else {
                continue;
            };
            let doc = address.doc_id as usize;
            if bits.get(doc) == Some(false) {
                bits.set(doc, true);
                count += 1;
            }
        }

        Self {
            generation: snapshot.key(),
            segments,
            count,
        }
    }

    /// Generation these bits were computed on.
    pub fn generation(&self) -> GenerationKey {
        self.generation
    }

    pub fn contains(&self, address: DocAddress) -> bool {
        self.segments
            .get(address.segment_ord as usize)
            .and_then(|bits| bits.get(address.doc_id as usize))
            .unwrap_or(false)
    }

    /// Number of matching documents.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Matching addresses in segment then doc order.
    pub fn iter(&self) -> impl Iterator<Item = DocAddress> + '_ {
        self.segments.iter().enumerate().flat_map(|(ord, bits)| {
            bits.iter()
                .enumerate()
                .filter(|(_, set)| *set)
                .map(move |(doc, _)| DocAddress::new(ord as u32, doc as u32))
        })
    }
}

/// Filter matching every document a tantivy query matches.
#[derive(Debug)]
pub struct QueryFilter {
    name: String,
    query: Box<dyn Query>,
}

impl QueryFilter {
    pub fn new(name: impl Into<String>, query: Box<dyn Query>) -> Self {
        Self {
            name: name.into(),
            query,
        }
    }

    /// Exact match of `value` in an untokenized field.
    pub fn term(field: Field, value: &str) -> Self {
        let term = Term::from_field_text(field, value);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        Self::new(format!("term:{}:{}", field.field_id(), value), Box::new(query))
    }
}

impl Filter for QueryFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn bits(&self, snapshot: &IndexSnapshot) -> Result<Arc<FilterBits>, SearchError> {
        let addresses = snapshot
            .searcher()
            .search(self.query.as_ref(), &DocSetCollector)?;
        Ok(Arc::new(FilterBits::from_addresses(snapshot, addresses)))
    }
}
