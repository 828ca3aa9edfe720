//! JSON-lines feed as an indexing routine.
//!
//! Each line is a [`SourceRecord`]. The checkpoint is the number of lines
//! consumed so far, so appending to the feed is picked up by the next pass
//! and a reindex replays it from line zero. Only newline-terminated lines
//! count; a partially written last line waits for the next pass.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use indexer_engine::{IndexError, Indexer, PassWriter};
use indexer_search::SourceRecord;
use tracing::{debug, warn};

/// Property holding the total number of lines consumed
pub const LINES_INDEXED_PROPERTY: &str = "lines_indexed";

/// Property holding the feed path
pub const SOURCE_PROPERTY: &str = "source";

/// Indexes a JSON-lines file, `batch_size` lines per pass.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
    batch_size: usize,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Indexer for JsonlSource {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn index(&mut self, writer: &mut PassWriter<'_>) -> Result<(), IndexError> {
        let start = match writer.checkpoint() {
            Some(checkpoint) => checkpoint.as_offset().ok_or_else(|| {
                IndexError::Corrupt(format!("checkpoint {} is not a line offset", checkpoint))
            })?,
            None => 0,
        };

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut buf = Vec::new();

        // A shorter feed than the checkpoint has nothing new to offer
        let mut positioned = 0u64;
        while positioned < start && read_complete_line(&mut reader, &mut buf)? {
            positioned += 1;
        }

        let mut consumed = start;
        let mut skipped = 0u64;
        let mut interrupted = false;
        let mut taken = 0usize;

        while positioned == start && taken < self.batch_size {
            if writer.is_cancelled() {
                interrupted = true;
                break;
            }
            // A trailing line without its newline is still being written
            if !read_complete_line(&mut reader, &mut buf)? {
                break;
            }
            consumed += 1;
            taken += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(line = consumed, error = %e, "Skipping record that is not UTF-8");
                    skipped += 1;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let record: SourceRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(line = consumed, error = %e, "Skipping malformed record");
                    skipped += 1;
                    continue;
                }
            };

            if record.deleted {
                writer.delete(&record.id)?;
            } else {
                let doc = record.to_document(writer.schema())?;
                writer.update(&record.id, doc)?;
            }
        }

        if consumed != start {
            writer.set_checkpoint(consumed.to_string())?;
        }
        writer.set_property(LINES_INDEXED_PROPERTY, consumed.to_string());
        writer.set_property(SOURCE_PROPERTY, self.path.display().to_string());

        debug!(
            path = %self.path.display(),
            from = start,
            to = consumed,
            skipped,
            "Consumed feed lines"
        );

        if interrupted {
            return Err(IndexError::Interrupted);
        }
        Ok(())
    }
}

/// Read the next newline-terminated line into `buf`.
///
/// Returns false at end of file or when the last line has no newline yet.
fn read_complete_line(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    let read = reader.read_until(b'\n', buf)?;
    Ok(read > 0 && buf.last() == Some(&b'\n'))
}
