//! Pass outcome E2E tests.
//!
//! Drives the engine's background loop and checks how each pass outcome
//! shows up in the committed generation, the report, and the wait before
//! the next pass.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use e2e_tests::{delays, wait_until, TestHarness, FOREVER_MS};
use indexer_engine::IndexError;
use indexer_search::build_document;
use indexer_types::{IndexStatus, Lifecycle, PassOutcome, ReportLevel};

const SETTLE: Duration = Duration::from_millis(300);
const TIMEOUT: Duration = Duration::from_secs(5);

/// A committing pass bumps the generation by one, persists its checkpoint
/// and is followed by the normal delay.
#[test]
fn test_commit_then_normal_wait() {
    let harness = TestHarness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let engine = harness.engine(delays(20, FOREVER_MS, FOREVER_MS), move |writer| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            let doc = build_document(writer.schema(), "a", "first document", &[])?;
            writer.add(doc)?;
            writer.set_checkpoint("5")?;
        }
        Ok(())
    });

    let before = engine.snapshot().generation();
    engine.start().unwrap();

    // The second pass only happens this soon if the normal delay was used
    assert!(wait_until(TIMEOUT, || engine.activity().passes_run >= 2));

    let report = engine.get_index_report(ReportLevel::Detailed);
    assert_eq!(report.generation, Some(before + 1));
    assert_eq!(report.checkpoint.unwrap().as_str(), "5");
    assert_eq!(report.status, IndexStatus::Ok);
    assert_eq!(engine.snapshot().num_docs(), 1);

    // Second pass was idle: nothing more happens within the settle window
    std::thread::sleep(SETTLE);
    assert_eq!(engine.activity().passes_run, 2);
    assert_eq!(engine.activity().last_outcome, Some(PassOutcome::Idle));

    engine.stop();
}

/// A pass that changes nothing leaves the generation alone and is followed
/// by the idle delay.
#[test]
fn test_idle_pass_waits_idle_delay() {
    let harness = TestHarness::new();
    let engine = harness.engine(delays(20, FOREVER_MS, 20), |_writer| Ok(()));

    engine.start().unwrap();
    assert!(wait_until(TIMEOUT, || engine.activity().passes_run >= 1));
    std::thread::sleep(SETTLE);

    let activity = engine.activity();
    assert_eq!(activity.passes_run, 1);
    assert_eq!(activity.last_outcome, Some(PassOutcome::Idle));
    assert_eq!(engine.snapshot().generation(), 0);
    assert_eq!(engine.status(), IndexStatus::Ok);

    engine.stop();
}

/// A failing pass keeps the checkpoint, reports the failure kind, retries at
/// the error delay, and clears back to Ok once a pass succeeds.
#[test]
fn test_failure_then_recovery() {
    let harness = TestHarness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    // Seed a checkpoint the failing passes must not disturb
    let seed = harness.engine(delays(0, 0, 0), |writer| {
        writer.set_checkpoint("seed")?;
        Ok(())
    });
    seed.run_once().unwrap();
    drop(seed);

    let engine = harness.engine(delays(FOREVER_MS, FOREVER_MS, 30), move |writer| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        let doc = build_document(writer.schema(), "x", "partial", &[])?;
        writer.add(doc)?;
        match call {
            0 => Err(IndexError::Io("disk unplugged".to_string())),
            1 => Err(IndexError::Corrupt("segment checksum".to_string())),
            _ => {
                writer.set_checkpoint("recovered")?;
                Ok(())
            }
        }
    });

    let first = engine.run_once().unwrap();
    assert_eq!(first.outcome, PassOutcome::Failed);
    assert_eq!(first.status, IndexStatus::IoError);
    assert_eq!(engine.checkpoint().unwrap().as_str(), "seed");
    assert_eq!(engine.snapshot().num_docs(), 0);
    assert_eq!(
        engine.delays().delay_for(first.outcome),
        Duration::from_millis(30)
    );

    // The loop retries at the error cadence: corrupt, then success
    engine.start().unwrap();
    assert!(wait_until(TIMEOUT, || engine.status() == IndexStatus::Ok));

    let report = engine.get_index_report(ReportLevel::Normal);
    assert_eq!(report.checkpoint.unwrap().as_str(), "recovered");
    assert_eq!(report.activity.unwrap().last_error, None);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(engine.snapshot().num_docs(), 1);

    engine.stop();
}

/// Persistent failures are reported on every report until a pass succeeds,
/// and the loop keeps retrying.
#[test]
fn test_corruption_reported_while_retrying() {
    let harness = TestHarness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let engine = harness.engine(delays(FOREVER_MS, FOREVER_MS, 10), move |_writer| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(IndexError::Corrupt("bad segment".to_string()))
    });

    engine.start().unwrap();
    assert!(wait_until(TIMEOUT, || calls.load(Ordering::SeqCst) >= 3));

    let report = engine.get_index_report(ReportLevel::Basic);
    assert_eq!(report.status, IndexStatus::Corrupt);
    assert_eq!(engine.lifecycle(), Lifecycle::Running);

    engine.stop();
    assert_eq!(engine.status(), IndexStatus::Corrupt);
}

/// A panicking routine is contained; the loop survives and reports it.
#[test]
fn test_panicking_routine_does_not_kill_loop() {
    let harness = TestHarness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let engine = harness.engine(delays(FOREVER_MS, FOREVER_MS, 10), move |_writer| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("routine bug");
        }
        Ok(())
    });

    engine.start().unwrap();
    assert!(wait_until(TIMEOUT, || calls.load(Ordering::SeqCst) >= 2));
    assert!(wait_until(TIMEOUT, || engine.status() == IndexStatus::Ok));
    assert_eq!(engine.lifecycle(), Lifecycle::Running);

    engine.stop();
}

/// Report levels nest: each level carries the fields of the one below.
#[test]
fn test_report_levels_nest() {
    let harness = TestHarness::new();
    let engine = harness.engine(delays(0, 0, 0), |writer| {
        writer.set_checkpoint("7")?;
        writer.set_property("documents", "0");
        Ok(())
    });

    let fresh = engine.get_index_report(ReportLevel::Detailed);
    assert_eq!(fresh.status, IndexStatus::Unavailable);
    assert_eq!(fresh.generation, Some(0));
    assert!(fresh.checkpoint.is_none());

    engine.run_once().unwrap();

    let basic = engine.get_index_report(ReportLevel::Basic);
    let normal = engine.get_index_report(ReportLevel::Normal);
    let detailed = engine.get_index_report(ReportLevel::Detailed);

    assert_eq!(basic.status, IndexStatus::Ok);
    assert!(basic.generation.is_none());
    assert!(basic.checkpoint.is_none());

    assert_eq!(normal.status, basic.status);
    assert_eq!(normal.generation, Some(1));
    assert_eq!(normal.checkpoint.as_ref().unwrap().as_str(), "7");
    assert!(normal.properties.is_none());

    assert_eq!(detailed.generation, normal.generation);
    assert_eq!(detailed.checkpoint, normal.checkpoint);
    assert_eq!(
        detailed.properties.unwrap().get("documents").map(String::as_str),
        Some("0")
    );
}
