//! Tests for the recording timeout.

use std::thread;
use std::time::{Duration, Instant};

use markprof::{Profiler, ProfilerSettings};

fn with_timeout(secs: i64) -> Profiler {
    Profiler::new(ProfilerSettings {
        timeout_secs: secs,
        ..ProfilerSettings::default()
    })
}

fn wait_disabled(profiler: &Profiler, limit: Duration) -> Option<Duration> {
    let started = Instant::now();
    while started.elapsed() < limit {
        if !profiler.is_enabled() {
            return Some(started.elapsed());
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}

#[test]
fn test_timeout_disables_recording() {
    let profiler = with_timeout(1);
    profiler.start_recording(None).unwrap();
    assert!(profiler.is_enabled());
    assert!((0..=1).contains(&profiler.remaining_timeout()));

    let elapsed = wait_disabled(&profiler, Duration::from_secs(3)).expect("timeout never fired");
    assert!(elapsed >= Duration::from_millis(900));
    assert_eq!(profiler.remaining_timeout(), -1);

    // Marks after the timeout are dropped.
    profiler.begin_mark("late", None);
    assert_eq!(profiler.count_running(), 0);
}

#[test]
fn test_restart_supersedes_pending_timeout() {
    let profiler = with_timeout(1);
    profiler.start_recording(None).unwrap();
    thread::sleep(Duration::from_millis(600));
    profiler.end_recording();
    profiler.start_recording(None).unwrap();

    // The first session's deadline passes without disabling the second.
    thread::sleep(Duration::from_millis(600));
    assert!(profiler.is_enabled());

    assert!(wait_disabled(&profiler, Duration::from_secs(3)).is_some());
}

#[test]
fn test_end_recording_cancels_timeout() {
    let profiler = with_timeout(1);
    profiler.start_recording(None).unwrap();
    profiler.end_recording();
    thread::sleep(Duration::from_millis(1_300));
    assert!(!profiler.is_enabled());
    assert_eq!(profiler.remaining_timeout(), -1);
}

#[test]
fn test_unlimited_timeout_keeps_recording() {
    let profiler = with_timeout(-1);
    profiler.start_recording(None).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(profiler.is_enabled());
    assert_eq!(profiler.remaining_timeout(), -1);
    profiler.end_recording();
}

#[test]
fn test_timeout_leaves_writer_for_end_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("marks.bin");
    let profiler = with_timeout(1);
    profiler.start_recording(Some(path.as_path())).unwrap();
    profiler.begin_mark("work", None);
    profiler.end_mark("work", None);

    assert!(wait_disabled(&profiler, Duration::from_secs(3)).is_some());
    assert!(profiler.is_persisting());
    let stats = profiler.end_recording().unwrap();
    assert_eq!(stats.written, 2);
    assert!(!profiler.is_persisting());
}
