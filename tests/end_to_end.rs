//! End-to-end harness runs
//!
//! Each test drives a full run over loopback with an ephemeral server port
//! and stores in a temp directory. Windows are kept short (3s intervals, one
//! producer interval) so a run takes about six seconds.

use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};

use dts_harness::records::generate;
use dts_harness::store::{create_source_store, ArchiveStore};
use dts_harness::{Harness, HarnessConfig, HarnessError, ProducerAnchor, RunState, Verdict};
use tempfile::tempdir;

fn test_config(dir: &Path, anchor: ProducerAnchor) -> HarnessConfig {
    HarnessConfig {
        work_dir: dir.to_path_buf(),
        server_port: 0,
        interval_secs: 3,
        interval_count: 1,
        join_timeout: Duration::from_secs(10),
        http_timeout: Duration::from_secs(1),
        producer_anchor: anchor,
        ..HarnessConfig::default()
    }
}

fn stores_present(dir: &Path) -> (bool, bool) {
    (
        dir.join("source.db").exists(),
        dir.join("target.db").exists(),
    )
}

#[test]
fn test_backlog_anchor_transfers_everything() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::new(test_config(dir.path(), ProducerAnchor::WindowEnd), false).unwrap();
    let window = harness.plan_window().unwrap();

    let outcome = harness.run(&window).unwrap();

    assert_eq!(outcome.verdict, Verdict::Passed { records: 3 });
    assert_eq!(outcome.final_state, RunState::Cleaned);
    assert!(!outcome.stores_kept);
    assert_eq!(stores_present(dir.path()), (false, false));
}

#[test]
fn test_streaming_anchor_transfers_everything() {
    let dir = tempdir().unwrap();
    let mut harness =
        Harness::new(test_config(dir.path(), ProducerAnchor::WindowStart), false).unwrap();
    let window = harness.plan_window().unwrap();

    let outcome = harness.run(&window).unwrap();

    assert!(outcome.verdict.is_passed(), "{}", outcome.verdict);
    assert_eq!(harness.state(), RunState::Cleaned);
}

#[test]
fn test_streaming_short_intervals_drain_tail_on_stop() {
    // Two-second intervals end the last live boundary before the seed does;
    // the tail only arrives through the drain flush at window close.
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), ProducerAnchor::WindowStart);
    config.interval_secs = 2;
    config.interval_count = 2;
    let mut harness = Harness::new(config, false).unwrap();
    let window = harness.plan_window().unwrap();

    let outcome = harness.run(&window).unwrap();

    assert_eq!(outcome.verdict, Verdict::Passed { records: 6 }, "{}", outcome.verdict);
}

#[test]
fn test_streaming_crosses_several_boundaries() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), ProducerAnchor::WindowStart);
    config.interval_count = 2;
    let mut harness = Harness::new(config, true).unwrap();
    let window = harness.plan_window().unwrap();

    let outcome = harness.run(&window).unwrap();

    assert_eq!(outcome.verdict, Verdict::Passed { records: 6 }, "{}", outcome.verdict);
    let target = ArchiveStore::open_read_only(&dir.path().join("target.db")).unwrap();
    assert_eq!(target.latest_timestamp().unwrap(), Some(window.start + 5));
}

#[test]
fn test_window_too_short_for_seed_rejected() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), ProducerAnchor::WindowStart);
    config.interval_secs = 1;
    config.interval_count = 1;

    assert!(matches!(
        Harness::new(config, false),
        Err(HarnessError::InvalidConfig(_))
    ));
    assert_eq!(stores_present(dir.path()), (false, false));
}

#[test]
fn test_debug_keeps_stores_with_seed_in_order() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::new(test_config(dir.path(), ProducerAnchor::WindowEnd), true).unwrap();
    let window = harness.plan_window().unwrap();

    let outcome = harness.run(&window).unwrap();

    assert!(outcome.verdict.is_passed(), "{}", outcome.verdict);
    assert!(outcome.stores_kept);
    assert_eq!(outcome.final_state, RunState::Verified);
    assert_eq!(stores_present(dir.path()), (true, true));

    let target = ArchiveStore::open_read_only(&dir.path().join("target.db")).unwrap();
    let expected: Vec<_> = generate(window.start, window.interval, window.interval_count).collect();
    assert_eq!(target.read_all().unwrap(), expected);
    assert_eq!(target.latest_timestamp().unwrap(), Some(window.start + 2));
}

#[test]
fn test_stale_stores_are_replaced() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), ProducerAnchor::WindowEnd);
    let schema = std::fs::read_to_string(&config.schema_path).unwrap();
    create_source_store(&config.source_path(), &schema, generate(10, 1, 5)).unwrap();
    create_source_store(&config.target_path(), &schema, generate(10, 1, 5)).unwrap();

    let mut harness = Harness::new(config, false).unwrap();
    let window = harness.plan_window().unwrap();
    let outcome = harness.run(&window).unwrap();

    assert!(outcome.verdict.is_passed(), "{}", outcome.verdict);
    assert_eq!(stores_present(dir.path()), (false, false));
}

#[test]
fn test_port_conflict_fails_and_cleans_up() {
    let dir = tempdir().unwrap();
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = test_config(dir.path(), ProducerAnchor::WindowEnd);
    config.server_port = occupied.local_addr().unwrap().port();

    let mut harness = Harness::new(config, false).unwrap();
    let window = harness.plan_window().unwrap();

    let started = Instant::now();
    let err = harness.run(&window).unwrap_err();

    assert!(
        matches!(err, HarnessError::WorkerFailure { worker: "consumer", .. }),
        "unexpected error: {}",
        err
    );
    assert!(started.elapsed() < window.duration());
    assert_eq!(harness.state(), RunState::Failed);
    assert_eq!(stores_present(dir.path()), (false, false));
}

#[test]
fn test_port_conflict_in_debug_keeps_seed() {
    let dir = tempdir().unwrap();
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = test_config(dir.path(), ProducerAnchor::WindowEnd);
    config.server_port = occupied.local_addr().unwrap().port();

    let mut harness = Harness::new(config, true).unwrap();
    let window = harness.plan_window().unwrap();

    assert!(harness.run(&window).is_err());
    assert!(dir.path().join("source.db").exists());
}
