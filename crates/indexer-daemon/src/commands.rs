//! Command implementations for the indexer daemon.
//!
//! Handles:
//! - run: background indexing loop with graceful shutdown on SIGINT/SIGTERM
//! - once / reindex: synchronous passes
//! - info / search: read-only inspection of the index

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use indexer_engine::{IndexerService, PassSummary};
use indexer_search::{
    default_schema, Filter, IndexSchema, QueryFilter, SearchIndex, SearchIndexConfig,
};
use indexer_types::{
    Activity, IndexReport, IndexStatus, Lifecycle, PassOutcome, ReportLevel, ReportSource,
    Settings,
};

use crate::source::JsonlSource;

/// Upper bound on passes made by a single `reindex` invocation
const MAX_REINDEX_PASSES: usize = 100_000;

/// CLI values that override loaded settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    pub index_path: Option<String>,
    pub source: Option<String>,
}

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, overrides: &Overrides) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(log_level) = &overrides.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(index_path) = &overrides.index_path {
        settings.index_path = index_path.clone();
    }
    if let Some(source) = &overrides.source {
        settings.source_path = Some(source.clone());
    }

    Ok(settings)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so that
/// `info` and `search` output stays parseable.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn index_config(settings: &Settings) -> SearchIndexConfig {
    SearchIndexConfig::new(settings.expanded_index_path())
        .with_memory_mb(settings.writer_memory_mb)
        .with_filter_cache_capacity(settings.filter_cache_capacity)
}

/// Open (or create) the index for writing.
pub fn open_index(settings: &Settings) -> Result<Arc<SearchIndex>> {
    let config = index_config(settings);
    fs::create_dir_all(&config.index_path).context("Failed to create index directory")?;
    let index =
        SearchIndex::open_or_create(config, default_schema()).context("Failed to open index")?;
    Ok(Arc::new(index))
}

/// Build a stopped engine over the configured feed.
pub fn build_engine(settings: &Settings) -> Result<IndexerService> {
    let source_path: PathBuf = match &settings.source_path {
        Some(path) => PathBuf::from(path),
        None => bail!("No source configured: pass --source or set source_path"),
    };
    let delays = settings
        .delay_policy()
        .context("Invalid delay configuration")?;
    let index = open_index(settings)?;

    info!(
        index = %settings.expanded_index_path().display(),
        source = %source_path.display(),
        batch_size = settings.batch_size,
        delays = %delays,
        "Indexer configured"
    );

    let source = JsonlSource::new(source_path, settings.batch_size);
    Ok(IndexerService::new(index, source, delays))
}

/// Run the background loop until SIGINT/SIGTERM.
pub async fn run_indexer(settings: Settings) -> Result<()> {
    let engine = build_engine(&settings)?;
    engine.start().context("Failed to start indexing engine")?;

    shutdown_signal().await;

    // stop() joins the loop thread; keep it off the async workers
    let report = tokio::task::spawn_blocking(move || {
        engine.stop();
        engine.get_index_report(ReportLevel::Normal)
    })
    .await
    .context("Shutdown task failed")?;

    info!(
        status = %report.status,
        generation = ?report.generation,
        checkpoint = ?report.checkpoint.as_ref().map(|c| c.as_str()),
        "Indexer shut down"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Run one pass and return its summary.
pub fn run_once(settings: &Settings) -> Result<PassSummary> {
    let engine = build_engine(settings)?;
    let summary = engine.run_once()?;
    if summary.outcome == PassOutcome::Failed {
        warn!(status = %summary.status, "Pass failed");
    }
    Ok(summary)
}

/// Clear the checkpoint and run passes until the feed is drained.
///
/// Returns the number of passes made.
pub fn reindex(settings: &Settings) -> Result<usize> {
    let engine = build_engine(settings)?;
    engine.clear_checkpoint();

    for passes in 1..=MAX_REINDEX_PASSES {
        let summary = engine.run_once()?;
        match summary.outcome {
            PassOutcome::Updated => continue,
            PassOutcome::Idle => {
                info!(passes, generation = summary.generation, "Reindex complete");
                return Ok(passes);
            }
            PassOutcome::Failed => {
                let report = engine.get_index_report(ReportLevel::Normal);
                let reason = report
                    .activity
                    .and_then(|a| a.last_error)
                    .unwrap_or_else(|| summary.status.to_string());
                bail!("Reindex failed after {} passes: {}", passes, reason);
            }
        }
    }

    bail!("Reindex did not converge after {} passes", MAX_REINDEX_PASSES)
}

/// Report on the persisted index without taking the writer lock.
///
/// Loop activity is not visible across processes, so the status is derived
/// from whether anything has been committed.
pub fn index_report(settings: &Settings, level: ReportLevel) -> Result<IndexReport> {
    let index = SearchIndex::open_read_only(index_config(settings), default_schema())
        .context("Failed to open index")?;
    let info = index.info();
    let delays = settings
        .delay_policy()
        .context("Invalid delay configuration")?;

    let status = if info.is_initial() {
        IndexStatus::Unavailable
    } else {
        IndexStatus::Ok
    };
    let activity = Activity::default();

    Ok(IndexReport::build(
        level,
        ReportSource {
            status,
            lifecycle: Lifecycle::Stopped,
            delays,
            info: &info,
            checkpoint: info.checkpoint.as_ref(),
            activity: &activity,
        },
    ))
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// Query document bodies, optionally restricted to a tag.
pub fn search(
    settings: &Settings,
    query: &str,
    tag: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let index = SearchIndex::open_read_only(index_config(settings), default_schema())
        .context("Failed to open index")?;
    search_index(&index, query, tag, limit)
}

fn search_index(
    index: &SearchIndex,
    query: &str,
    tag: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let schema: &IndexSchema = index.schema();
    let body = schema.field("body")?;
    let parsed = index.parse_query(query, vec![body])?;
    let snapshot = index.snapshot();

    let allowed = match tag {
        Some(tag) => Some(QueryFilter::term(schema.field("tags")?, tag).bits(&snapshot)?),
        None => None,
    };

    // Over-fetch when filtering so the limit applies after the filter
    let fetch = if allowed.is_some() {
        limit.saturating_mul(4).max(limit)
    } else {
        limit
    };

    let mut hits = Vec::new();
    for (score, address) in snapshot.search(parsed.as_ref(), fetch)? {
        if let Some(bits) = &allowed {
            if !bits.contains(address) {
                continue;
            }
        }
        if let Some(id) = snapshot.stored_text(address, schema.key)? {
            hits.push(SearchHit { id, score });
        }
        if hits.len() == limit {
            break;
        }
    }
    Ok(hits)
}
