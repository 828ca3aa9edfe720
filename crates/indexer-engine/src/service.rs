//! Indexer service: the background pass loop and its control surface.
//!
//! One loop thread per running engine. Each iteration acquires the index
//! writer, runs the indexing routine, commits or rolls back, then sleeps for
//! the delay matching the pass outcome. Control operations take the engine
//! lock only briefly; the routine runs without it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::Utc;
use indexer_search::{IndexSnapshot, SearchIndex, StagingWriter};
use indexer_types::{
    Activity, Checkpoint, DelayPolicy, IndexReport, IndexStatus, Lifecycle, PassOutcome,
    ReportLevel, ReportSource,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, IndexError};
use crate::indexer::Indexer;
use crate::writer::{PassStats, PassWriter};

const LOOP_THREAD_NAME: &str = "indexer-loop";

/// Result of one pass, as returned by [`IndexerService::run_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub outcome: PassOutcome,
    /// Engine status after the pass
    pub status: IndexStatus,
    /// Index generation after the pass
    pub generation: u64,
    pub stats: PassStats,
    /// The pass was cut short by a cancellation
    pub interrupted: bool,
}

/// How a pass ended, before it is folded into engine state.
enum Execution {
    Committed {
        generation: u64,
        stats: PassStats,
        interrupted: bool,
    },
    Idle {
        stats: PassStats,
        interrupted: bool,
    },
    /// Cancelled after a failed mutation; rolled back
    Interrupted { stats: PassStats },
    Failed { error: IndexError, stats: PassStats },
}

struct EngineState {
    lifecycle: Lifecycle,
    delays: DelayPolicy,
    status: IndexStatus,
    activity: Activity,
    /// Checkpoint the next pass must start from, overriding the persisted
    /// one. `Some(None)` forces an absent checkpoint.
    forced: Option<Option<Checkpoint>>,
    /// Bumped on every forced change, so a pass only consumes the value it read
    forced_seq: u64,
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
    last_pass_end: Option<Instant>,
}

struct Shared {
    index: Arc<SearchIndex>,
    indexer: Mutex<Box<dyn Indexer>>,
    state: Mutex<EngineState>,
    changed: Condvar,
}

/// Incremental indexing engine.
///
/// Dropping the service stops the loop.
pub struct IndexerService {
    shared: Arc<Shared>,
}

impl IndexerService {
    /// Create a stopped engine over `index`.
    pub fn new(
        index: Arc<SearchIndex>,
        indexer: impl Indexer + 'static,
        delays: DelayPolicy,
    ) -> Self {
        let state = EngineState {
            lifecycle: Lifecycle::Stopped,
            delays,
            status: IndexStatus::Unavailable,
            activity: Activity::default(),
            forced: None,
            forced_seq: 0,
            token: CancellationToken::new(),
            worker: None,
            last_pass_end: None,
        };

        Self {
            shared: Arc::new(Shared {
                index,
                indexer: Mutex::new(Box::new(indexer)),
                state: Mutex::new(state),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.shared.index
    }

    /// Latest committed snapshot of the index.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.shared.index.snapshot()
    }

    /// Start the background loop.
    ///
    /// No-op while starting or running. Waits for a concurrent stop to
    /// finish first.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut state = self.shared.lock_state();
        loop {
            match state.lifecycle {
                Lifecycle::Starting | Lifecycle::Running => {
                    debug!(lifecycle = %state.lifecycle, "Start ignored, engine already active");
                    return Ok(());
                }
                Lifecycle::Stopping => state = self.shared.wait(state),
                Lifecycle::Stopped => break,
            }
        }

        // Reap a loop that ended on its own
        if let Some(handle) = state.worker.take() {
            if handle.join().is_err() {
                warn!("Previous indexing loop terminated abnormally");
            }
        }

        let token = CancellationToken::new();
        state.token = token.clone();
        state.lifecycle = Lifecycle::Starting;

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_string())
            .spawn(move || run_loop(shared, token));

        match spawned {
            Ok(handle) => {
                state.worker = Some(handle);
                info!(delays = %state.delays, "Indexing engine starting");
                Ok(())
            }
            Err(e) => {
                state.lifecycle = Lifecycle::Stopped;
                self.shared.changed.notify_all();
                Err(e.into())
            }
        }
    }

    /// Stop the background loop and wait for it to exit.
    ///
    /// Cancels an in-flight pass and wakes a sleeping loop. Idempotent.
    /// Must not be called from inside the indexing routine.
    pub fn stop(&self) {
        let mut state = self.shared.lock_state();
        loop {
            match state.lifecycle {
                Lifecycle::Starting | Lifecycle::Running => break,
                Lifecycle::Stopping => state = self.shared.wait(state),
                Lifecycle::Stopped => {
                    let finished = state.worker.take();
                    drop(state);
                    if let Some(handle) = finished {
                        let _ = handle.join();
                    }
                    return;
                }
            }
        }

        info!("Indexing engine stopping");
        state.lifecycle = Lifecycle::Stopping;
        state.token.cancel();
        self.shared.changed.notify_all();
        let worker = state.worker.take();
        drop(state);

        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!("Indexing loop terminated abnormally");
            }
        }

        let mut state = self.shared.lock_state();
        state.lifecycle = Lifecycle::Stopped;
        self.shared.changed.notify_all();
        info!(status = %state.status, "Indexing engine stopped");
    }

    /// Stop, forget the checkpoint, and start again.
    ///
    /// The first pass after a reindex reads an absent checkpoint, so the
    /// routine rebuilds from the beginning of its source.
    pub fn reindex(&self) -> Result<(), EngineError> {
        info!("Reindex requested");
        self.stop();
        self.clear_checkpoint();
        self.start()
    }

    /// Replace the delay policy.
    ///
    /// A sleeping loop re-arms from the end of the last pass with the new
    /// policy.
    pub fn set_delays(&self, delays: DelayPolicy) {
        let mut state = self.shared.lock_state();
        state.delays = delays;
        self.shared.changed.notify_all();
        info!(delays = %delays, "Delay policy updated");
    }

    /// Force the checkpoint the next pass starts from.
    pub fn set_checkpoint(&self, value: &str) -> Result<(), EngineError> {
        let checkpoint = Checkpoint::new(value)?;
        info!(checkpoint = %checkpoint, "Checkpoint forced");
        self.force_checkpoint(Some(checkpoint));
        Ok(())
    }

    /// Force the next pass to start from an absent checkpoint.
    pub fn clear_checkpoint(&self) {
        info!("Checkpoint cleared");
        self.force_checkpoint(None);
    }

    fn force_checkpoint(&self, checkpoint: Option<Checkpoint>) {
        let mut state = self.shared.lock_state();
        state.forced = Some(checkpoint);
        state.forced_seq += 1;
    }

    /// Snapshot of engine state at the requested level of detail.
    pub fn get_index_report(&self, level: ReportLevel) -> IndexReport {
        let info = self.shared.index.info();
        let state = self.shared.lock_state();
        let checkpoint = match &state.forced {
            Some(forced) => forced.as_ref(),
            None => info.checkpoint.as_ref(),
        };

        IndexReport::build(
            level,
            ReportSource {
                status: state.status,
                lifecycle: state.lifecycle,
                delays: state.delays,
                info: &info,
                checkpoint,
                activity: &state.activity,
            },
        )
    }

    /// Checkpoint the next pass will start from.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        let state = self.shared.lock_state();
        match &state.forced {
            Some(forced) => forced.clone(),
            None => self.shared.index.info().checkpoint,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lock_state().lifecycle
    }

    pub fn delays(&self) -> DelayPolicy {
        self.shared.lock_state().delays
    }

    pub fn status(&self) -> IndexStatus {
        self.shared.lock_state().status
    }

    pub fn activity(&self) -> Activity {
        self.shared.lock_state().activity.clone()
    }

    /// Run a single pass on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AlreadyRunning` unless the engine is stopped.
    pub fn run_once(&self) -> Result<PassSummary, EngineError> {
        {
            let state = self.shared.lock_state();
            if state.lifecycle != Lifecycle::Stopped {
                return Err(EngineError::AlreadyRunning);
            }
        }
        Ok(self.shared.run_pass(&CancellationToken::new()))
    }
}

impl Drop for IndexerService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, EngineState>) -> MutexGuard<'a, EngineState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep out the delay after the last pass.
    ///
    /// Returns false if cancelled. Re-evaluates the deadline on every wake so
    /// delay changes apply to the current sleep.
    fn sleep_after_pass(&self, token: &CancellationToken) -> bool {
        let mut state = self.lock_state();
        loop {
            if token.is_cancelled() {
                return false;
            }

            let outcome = state.activity.last_outcome.unwrap_or(PassOutcome::Idle);
            let delay = state.delays.delay_for(outcome);
            let last_end = state.last_pass_end.unwrap_or_else(Instant::now);

            match last_end.checked_add(delay) {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    let (guard, _) = self
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
                // Too far out to represent: sleep until woken
                None => state = self.wait(state),
            }
        }
    }

    fn run_pass(&self, token: &CancellationToken) -> PassSummary {
        let (forced, forced_seq) = {
            let mut state = self.lock_state();
            state.activity.pass_in_progress = true;
            (state.forced.clone(), state.forced_seq)
        };

        let started = Instant::now();
        let mut indexer = self.indexer.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(indexer = indexer.name(), "Pass starting");
        let execution = self.execute(&mut **indexer, forced, token);
        let name = indexer.name().to_string();
        drop(indexer);

        self.finish(&name, execution, forced_seq, started)
    }

    fn execute(
        &self,
        indexer: &mut dyn Indexer,
        forced: Option<Option<Checkpoint>>,
        token: &CancellationToken,
    ) -> Execution {
        let staging = match self.index.writer() {
            Ok(staging) => staging,
            Err(e) => {
                return Execution::Failed {
                    error: e.into(),
                    stats: PassStats::default(),
                }
            }
        };

        // Read under the writer so no other commit can interleave
        let snapshot = self.index.snapshot();
        let info = snapshot.info();
        let checkpoint = match forced {
            Some(forced) => forced,
            None => info.checkpoint.clone(),
        };

        let mut writer = PassWriter::new(
            staging,
            checkpoint,
            info.properties.clone(),
            token.clone(),
            snapshot.num_docs(),
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| indexer.index(&mut writer)))
            .unwrap_or_else(|payload| Err(IndexError::Panicked(panic_message(&*payload))));

        let stats = writer.stats();
        let interrupted = match result {
            Ok(()) => false,
            Err(IndexError::Interrupted) if writer.is_safe() => true,
            Err(IndexError::Interrupted) => {
                discard(writer.into_parts().0);
                return Execution::Interrupted { stats };
            }
            Err(error) => {
                discard(writer.into_parts().0);
                return Execution::Failed { error, stats };
            }
        };

        let (staging, pass) = writer.into_parts();
        let changed = staging.has_staged()
            || pass.checkpoint != info.checkpoint
            || pass.properties != info.properties;

        if !changed {
            return Execution::Idle { stats, interrupted };
        }

        let next = info.next_generation(pass.checkpoint, pass.properties);
        match self.index.commit(staging, &next) {
            Ok(committed) => Execution::Committed {
                generation: committed.generation(),
                stats,
                interrupted,
            },
            Err(e) => Execution::Failed {
                error: e.into(),
                stats,
            },
        }
    }

    fn finish(
        &self,
        indexer: &str,
        execution: Execution,
        forced_seq: u64,
        started: Instant,
    ) -> PassSummary {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let generation = self.index.snapshot().generation();

        let mut state = self.lock_state();
        state.activity.pass_in_progress = false;
        state.activity.passes_run += 1;
        state.activity.last_pass_at = Some(Utc::now());
        state.last_pass_end = Some(Instant::now());

        let (outcome, stats, interrupted) = match execution {
            Execution::Committed {
                generation,
                stats,
                interrupted,
            } => {
                consume_forced(&mut state, forced_seq);
                if !interrupted {
                    state.status = IndexStatus::Ok;
                    state.activity.last_error = None;
                }
                info!(
                    indexer,
                    generation,
                    added = stats.added,
                    updated = stats.updated,
                    deleted = stats.deleted,
                    interrupted,
                    elapsed_ms,
                    "Pass committed"
                );
                (PassOutcome::Updated, stats, interrupted)
            }
            Execution::Idle { stats, interrupted } => {
                consume_forced(&mut state, forced_seq);
                if !interrupted {
                    state.status = IndexStatus::Ok;
                    state.activity.last_error = None;
                }
                debug!(indexer, generation, interrupted, elapsed_ms, "Pass found nothing to do");
                (PassOutcome::Idle, stats, interrupted)
            }
            Execution::Interrupted { stats } => {
                state.status = IndexStatus::Interrupted;
                state.activity.last_error = Some(IndexError::Interrupted.to_string());
                warn!(
                    indexer,
                    failed = stats.failed,
                    elapsed_ms,
                    "Interrupted pass had failed mutations, rolled back"
                );
                (PassOutcome::Failed, stats, true)
            }
            Execution::Failed { error, stats } => {
                state.status = error.kind();
                state.activity.last_error = Some(error.to_string());
                match &error {
                    IndexError::Panicked(_) => {
                        error!(indexer, error = %error, elapsed_ms, "Indexing routine panicked")
                    }
                    _ => warn!(
                        indexer,
                        status = %state.status,
                        error = %error,
                        elapsed_ms,
                        "Pass failed, rolled back"
                    ),
                }
                (PassOutcome::Failed, stats, false)
            }
        };

        state.activity.last_outcome = Some(outcome);
        PassSummary {
            outcome,
            status: state.status,
            generation,
            stats,
            interrupted,
        }
    }
}

/// Drop the forced checkpoint if it is still the one the pass read.
fn consume_forced(state: &mut EngineState, forced_seq: u64) {
    if state.forced_seq == forced_seq {
        state.forced = None;
    }
}

fn discard(staging: StagingWriter<'_>) {
    if let Err(e) = staging.rollback() {
        warn!(error = %e, "Rollback failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_loop(shared: Arc<Shared>, token: CancellationToken) {
    {
        let mut state = shared.lock_state();
        if state.lifecycle == Lifecycle::Starting {
            state.lifecycle = Lifecycle::Running;
        }
        shared.changed.notify_all();
    }
    info!("Indexing loop running");

    while !token.is_cancelled() {
        let summary = shared.run_pass(&token);
        if summary.interrupted || !shared.sleep_after_pass(&token) {
            break;
        }
    }

    // A stop in progress finishes the transition after joining
    let mut state = shared.lock_state();
    if state.lifecycle.is_active() {
        state.lifecycle = Lifecycle::Stopped;
        info!("Indexing loop ended by routine");
    }
    shared.changed.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::from_fn;
    use indexer_search::{build_document, default_schema};

    fn engine(
        f: impl FnMut(&mut PassWriter<'_>) -> Result<(), IndexError> + Send + 'static,
    ) -> IndexerService {
        let index = Arc::new(SearchIndex::create_in_ram(default_schema()).unwrap());
        IndexerService::new(index, from_fn("test", f), DelayPolicy::default())
    }

    #[test]
    fn test_new_engine_is_stopped_and_unavailable() {
        let engine = engine(|_| Ok(()));
        assert_eq!(engine.lifecycle(), Lifecycle::Stopped);
        assert_eq!(engine.status(), IndexStatus::Unavailable);
        assert!(engine.checkpoint().is_none());

        let report = engine.get_index_report(ReportLevel::Detailed);
        assert_eq!(report.generation, Some(0));
        assert_eq!(report.properties, Some(Default::default()));
    }

    #[test]
    fn test_run_once_commits_changes() {
        let engine = engine(|w| {
            let schema = w.schema().clone();
            w.add(build_document(&schema, "1", "one", &[])?)?;
            w.set_checkpoint("5")?;
            Ok(())
        });

        let summary = engine.run_once().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Updated);
        assert_eq!(summary.status, IndexStatus::Ok);
        assert_eq!(summary.generation, 1);
        assert_eq!(summary.stats.added, 1);
        assert_eq!(engine.checkpoint().unwrap().as_str(), "5");
        assert_eq!(engine.snapshot().num_docs(), 1);
    }

    #[test]
    fn test_run_once_idle_keeps_generation() {
        let engine = engine(|_| Ok(()));
        let summary = engine.run_once().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Idle);
        assert_eq!(summary.status, IndexStatus::Ok);
        assert_eq!(summary.generation, 0);
    }

    #[test]
    fn test_property_change_commits() {
        let engine = engine(|w| {
            w.set_property("source", "unit");
            Ok(())
        });

        assert_eq!(engine.run_once().unwrap().outcome, PassOutcome::Updated);
        // Same property again is not a change
        assert_eq!(engine.run_once().unwrap().outcome, PassOutcome::Idle);
        assert_eq!(engine.index().info().property("source"), Some("unit"));
    }

    #[test]
    fn test_failure_rolls_back() {
        let engine = engine(|w| {
            let schema = w.schema().clone();
            w.add(build_document(&schema, "1", "one", &[])?)?;
            w.set_checkpoint("9")?;
            Err(IndexError::Io("source unreachable".into()))
        });

        let summary = engine.run_once().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Failed);
        assert_eq!(summary.status, IndexStatus::IoError);
        assert_eq!(summary.generation, 0);
        assert!(engine.checkpoint().is_none());
        assert_eq!(engine.snapshot().num_docs(), 0);
        assert_eq!(
            engine.activity().last_error.as_deref(),
            Some("IO error: source unreachable")
        );
    }

    #[test]
    fn test_panic_is_contained() {
        let engine = engine(|_| panic!("routine exploded"));

        let summary = engine.run_once().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Failed);
        assert_eq!(summary.status, IndexStatus::Corrupt);
        assert!(engine
            .activity()
            .last_error
            .unwrap()
            .contains("routine exploded"));

        // The routine lock is still usable
        assert!(engine.run_once().is_ok());
    }

    #[test]
    fn test_interrupted_safe_pass_commits() {
        let engine = engine(|w| {
            let schema = w.schema().clone();
            w.add(build_document(&schema, "1", "one", &[])?)?;
            w.set_checkpoint("1")?;
            Err(IndexError::Interrupted)
        });

        let summary = engine.run_once().unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.outcome, PassOutcome::Updated);
        // Status untouched by an interruption
        assert_eq!(summary.status, IndexStatus::Unavailable);
        assert_eq!(engine.checkpoint().unwrap().as_str(), "1");
    }

    #[test]
    fn test_forced_checkpoint_read_and_persisted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let engine = engine(move |w| {
            recorder
                .lock()
                .unwrap()
                .push(w.checkpoint().map(|c| c.to_string()));
            Ok(())
        });

        engine.set_checkpoint("42").unwrap();
        assert_eq!(engine.checkpoint().unwrap().as_str(), "42");

        let summary = engine.run_once().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Updated);
        assert_eq!(engine.index().info().checkpoint.unwrap().as_str(), "42");

        engine.run_once().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("42".to_string()), Some("42".to_string())]
        );
    }

    #[test]
    fn test_forced_checkpoint_survives_failed_pass() {
        let engine = engine(|_| Err(IndexError::Io("down".into())));
        engine.set_checkpoint("7").unwrap();

        engine.run_once().unwrap();
        assert_eq!(engine.checkpoint().unwrap().as_str(), "7");
    }

    #[test]
    fn test_set_checkpoint_rejects_empty() {
        let engine = engine(|_| Ok(()));
        assert!(matches!(
            engine.set_checkpoint(""),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_delays() {
        let engine = engine(|_| Ok(()));
        let delays = DelayPolicy::of(1, 2, 3).unwrap();
        engine.set_delays(delays);
        assert_eq!(engine.delays(), delays);
        assert_eq!(
            engine.get_index_report(ReportLevel::Normal).delays,
            Some(delays)
        );
    }

    #[test]
    fn test_run_once_rejected_while_running() {
        let engine = engine(|_| Ok(()));
        engine.start().unwrap();
        assert!(matches!(engine.run_once(), Err(EngineError::AlreadyRunning)));
        engine.stop();
        assert!(engine.run_once().is_ok());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
