//! End-to-end test infrastructure for the search indexer.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the full routine-to-query pipeline.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexer_engine::{from_fn, IndexError, IndexerService, PassWriter};
use indexer_search::{default_schema, SearchIndex, SearchIndexConfig, SourceRecord};
use indexer_types::{DelayPolicy, Settings};

/// Delay long enough that a test never sees it elapse
pub const FOREVER_MS: i64 = 60_000;

/// Shared test harness for E2E tests.
///
/// Provides an on-disk index location and a JSON-lines feed file.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Directory holding the tantivy index
    pub index_path: PathBuf,
    /// JSON-lines feed read by `JsonlSource`
    pub feed_path: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with an empty index directory and feed.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index_path = temp_dir.path().join("index");
        let feed_path = temp_dir.path().join("feed.jsonl");

        fs::create_dir_all(&index_path).expect("Failed to create index dir");
        fs::write(&feed_path, "").expect("Failed to create feed");

        Self {
            _temp_dir: temp_dir,
            index_path,
            feed_path,
        }
    }

    /// Open (or create) the index with the default schema.
    pub fn open_index(&self) -> Arc<SearchIndex> {
        let config = SearchIndexConfig::new(&self.index_path);
        Arc::new(SearchIndex::open_or_create(config, default_schema()).expect("Failed to open index"))
    }

    /// Engine over this harness's index driven by a closure routine.
    pub fn engine<F>(&self, delays: DelayPolicy, f: F) -> IndexerService
    where
        F: FnMut(&mut PassWriter<'_>) -> Result<(), IndexError> + Send + 'static,
    {
        IndexerService::new(self.open_index(), from_fn("e2e", f), delays)
    }

    /// Append records to the feed.
    pub fn append_feed(&self, records: &[SourceRecord]) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.feed_path)
            .expect("Failed to open feed");
        for record in records {
            let line = serde_json::to_string(record).expect("Failed to serialize record");
            writeln!(file, "{}", line).expect("Failed to write feed");
        }
    }

    /// Daemon settings pointing at this harness.
    pub fn settings(&self) -> Settings {
        Settings {
            index_path: self.index_path.to_string_lossy().to_string(),
            source_path: Some(self.feed_path.to_string_lossy().to_string()),
            ..Default::default()
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Record `id` with `body`, tagged "odd" or "even" by its numeric value.
pub fn numbered_record(id: u32, body: &str) -> SourceRecord {
    let parity = if id % 2 == 1 { "odd" } else { "even" };
    SourceRecord::new(id.to_string(), body).with_tags(vec![parity.to_string()])
}

/// Delay policy from millisecond values.
pub fn delays(normal_ms: i64, idle_ms: i64, error_ms: i64) -> DelayPolicy {
    DelayPolicy::of(normal_ms, idle_ms, error_ms).expect("Invalid test delays")
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// passes. Returns whether it held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Run `f` and return how long it took.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let started = Instant::now();
    let value = f();
    (value, started.elapsed())
}
