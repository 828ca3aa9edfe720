//! Tantivy index management.
//!
//! Owns the single `IndexWriter`, a manually reloaded `IndexReader`, and the
//! latest published [`IndexSnapshot`]. Every commit carries the new
//! [`IndexInfo`] as its payload, so documents and checkpoint become visible
//! together or not at all.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tantivy::query::{Query, QueryParser};
use tantivy::schema::Field;
use tantivy::{Index, IndexMeta, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info, warn};

use indexer_types::IndexInfo;

use crate::error::SearchError;
use crate::filter::{CachingFilter, Filter};
use crate::schema::IndexSchema;
use crate::snapshot::IndexSnapshot;
use crate::writer::StagingWriter;

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Default number of generations a caching filter keeps
pub const DEFAULT_FILTER_CACHE_CAPACITY: usize = 4;

/// Reload attempts before `refresh` gives up on a busy writer
const REFRESH_ATTEMPTS: usize = 8;

static NEXT_INDEX_ID: AtomicU64 = AtomicU64::new(1);

/// Search index configuration
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Path to index directory
    pub index_path: PathBuf,
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
    /// Generations kept per caching filter
    pub filter_cache_capacity: usize,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("./index"),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
            filter_cache_capacity: DEFAULT_FILTER_CACHE_CAPACITY,
        }
    }
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            ..Default::default()
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    pub fn with_filter_cache_capacity(mut self, capacity: usize) -> Self {
        self.filter_cache_capacity = capacity;
        self
    }
}

/// Tantivy index with its single writer and published snapshots.
pub struct SearchIndex {
    id: u64,
    index: Index,
    schema: IndexSchema,
    config: SearchIndexConfig,
    /// None when opened read-only
    writer: Option<Mutex<IndexWriter>>,
    reader: IndexReader,
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SearchIndex {
    /// Open existing index or create new one.
    ///
    /// An existing index keeps its on-disk schema; `schema` only supplies the
    /// key field name, which must exist there.
    pub fn open_or_create(
        config: SearchIndexConfig,
        schema: IndexSchema,
    ) -> Result<Self, SearchError> {
        let path = &config.index_path;
        let (index, schema) = if path.join("meta.json").exists() {
            debug!(path = ?path, "Opening existing index");
            let index = Index::open_in_dir(path)?;
            let schema = IndexSchema::from_schema(index.schema(), schema.key_name())?;
            (index, schema)
        } else {
            info!(path = ?path, "Creating new index");
            std::fs::create_dir_all(path)?;
            let index = Index::create_in_dir(path, schema.schema().clone())?;
            (index, schema)
        };

        Self::from_index(index, schema, config, true)
    }

    /// Open an existing index without taking the writer lock.
    ///
    /// Safe while another process is indexing. `writer()` fails.
    pub fn open_read_only(
        config: SearchIndexConfig,
        schema: IndexSchema,
    ) -> Result<Self, SearchError> {
        let index = Index::open_in_dir(&config.index_path)?;
        let schema = IndexSchema::from_schema(index.schema(), schema.key_name())?;
        Self::from_index(index, schema, config, false)
    }

    /// Create a throwaway index in memory.
    pub fn create_in_ram(schema: IndexSchema) -> Result<Self, SearchError> {
        let index = Index::create_in_ram(schema.schema().clone());
        Self::from_index(index, schema, SearchIndexConfig::default(), true)
    }

    fn from_index(
        index: Index,
        schema: IndexSchema,
        config: SearchIndexConfig,
        writable: bool,
    ) -> Result<Self, SearchError> {
        let writer = if writable {
            let memory_budget = config.writer_memory_mb * 1024 * 1024;
            let writer: IndexWriter = index.writer(memory_budget)?;
            Some(Mutex::new(writer))
        } else {
            None
        };
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        let info = read_info(&index)?;
        let id = NEXT_INDEX_ID.fetch_add(1, Ordering::Relaxed);
        let snapshot = IndexSnapshot::new(id, info, reader.searcher());

        info!(
            generation = snapshot.generation(),
            num_docs = snapshot.num_docs(),
            writable,
            "Opened search index"
        );

        Ok(Self {
            id,
            index,
            schema,
            config,
            writer,
            reader,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Get the index schema
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Get the underlying Tantivy index
    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn config(&self) -> &SearchIndexConfig {
        &self.config
    }

    /// Get the index path
    pub fn path(&self) -> &Path {
        &self.config.index_path
    }

    /// Acquire the writer for one pass. Blocks while another pass holds it.
    pub fn writer(&self) -> Result<StagingWriter<'_>, SearchError> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| SearchError::IndexLocked("index opened read-only".to_string()))?;
        let guard = match writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // A pass panicked while holding the writer
                warn!("Recovering poisoned index writer");
                let mut guard = poisoned.into_inner();
                guard.rollback()?;
                writer.clear_poison();
                guard
            }
        };
        Ok(StagingWriter::new(guard, &self.schema))
    }

    /// Commit staged changes together with `info`, then publish a snapshot.
    ///
    /// `info.generation` must be exactly one past the current generation.
    pub fn commit(
        &self,
        mut writer: StagingWriter<'_>,
        info: &IndexInfo,
    ) -> Result<Arc<IndexSnapshot>, SearchError> {
        let current = self.snapshot().generation();
        if info.generation != current + 1 {
            writer.rollback()?;
            return Err(SearchError::GenerationMismatch {
                expected: current + 1,
                actual: info.generation,
            });
        }

        let payload = info.to_json()?;
        let staged = writer.staged();
        let opstamp = writer.commit_with(&payload)?;

        // Publish while still holding the writer so snapshots stay ordered
        self.reader.reload()?;
        let snapshot = Arc::new(IndexSnapshot::new(
            self.id,
            info.clone(),
            self.reader.searcher(),
        ));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        drop(writer);

        info!(
            generation = info.generation,
            opstamp,
            staged,
            checkpoint = ?info.checkpoint.as_ref().map(|c| c.as_str()),
            "Committed index changes"
        );
        Ok(snapshot)
    }

    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    /// Pick up commits made by another process. Read-only indexes only.
    ///
    /// Keeps the current snapshot if the writer keeps committing faster than
    /// a consistent reload can be taken.
    pub fn refresh(&self) -> Result<Arc<IndexSnapshot>, SearchError> {
        self.refresh_with(|| {})
    }

    fn refresh_with(
        &self,
        mut after_reload: impl FnMut(),
    ) -> Result<Arc<IndexSnapshot>, SearchError> {
        if self.is_writable() {
            return Ok(self.snapshot());
        }
        for attempt in 1..=REFRESH_ATTEMPTS {
            let before = self.index.load_metas()?;
            self.reader.reload()?;
            let searcher = self.reader.searcher();
            after_reload();
            let after = self.index.load_metas()?;

            // The searcher matches the payload only if no commit landed in between
            if before.opstamp != after.opstamp {
                debug!(attempt, "Index changed during refresh, retrying");
                continue;
            }
            let info = info_from_metas(&after)?;
            let snapshot = Arc::new(IndexSnapshot::new(self.id, info, searcher));
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
            return Ok(snapshot);
        }
        warn!(attempts = REFRESH_ATTEMPTS, "Index kept changing, keeping previous snapshot");
        Ok(self.snapshot())
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Info of the latest commit.
    pub fn info(&self) -> IndexInfo {
        self.snapshot().info().clone()
    }

    /// Re-read the info stored with the last commit on disk.
    pub fn load_info(&self) -> Result<IndexInfo, SearchError> {
        read_info(&self.index)
    }

    /// Wrap `inner` in a cache sized by this index's configuration.
    pub fn caching_filter<F: Filter>(&self, inner: F) -> CachingFilter<F> {
        CachingFilter::with_capacity(inner, self.config.filter_cache_capacity)
    }

    /// Parse a query string over `default_fields`.
    pub fn parse_query(
        &self,
        query: &str,
        default_fields: Vec<Field>,
    ) -> Result<Box<dyn Query>, SearchError> {
        let parser = QueryParser::for_index(&self.index, default_fields);
        Ok(parser.parse_query(query)?)
    }
}

/// Decode the payload of the last commit. No payload means no commit yet.
fn read_info(index: &Index) -> Result<IndexInfo, SearchError> {
    info_from_metas(&index.load_metas()?)
}

fn info_from_metas(metas: &IndexMeta) -> Result<IndexInfo, SearchError> {
    match &metas.payload {
        Some(payload) => Ok(IndexInfo::from_json(payload)?),
        None => Ok(IndexInfo::initial()),
    }
}
