//! Tests for tree rendering and per-mark totals of real recordings.

use markprof::report::{aggregate, render_tree, top_level};
use markprof::{Profiler, ProfilerSettings};

fn recorded() -> Profiler {
    let profiler = Profiler::new(ProfilerSettings::default());
    profiler.start_recording(None).unwrap();
    profiler.begin_mark_at("handle", None, 0);
    for (i, key) in ["users", "orders"].iter().enumerate() {
        let base = 10 + i as u64 * 30;
        profiler.begin_mark_at("query", Some(key), base);
        profiler.end_mark_at("query", Some(key), base + 20);
    }
    profiler.end_mark_at("handle", None, 100);
    profiler.end_recording();
    profiler
}

#[test]
fn test_top_level_matches_recorded_roots() {
    let profiler = recorded();
    let roots = top_level(&profiler.recorded_records());
    let expected: Vec<_> = profiler.recorded_roots().iter().map(|n| n.to_record()).collect();
    assert_eq!(roots, expected);
    assert_eq!(roots.len(), 1);
}

#[test]
fn test_aggregate_totals() {
    let profiler = recorded();
    let totals = aggregate(&top_level(&profiler.recorded_records()));

    assert_eq!(totals.len(), 2);
    let handle = totals.iter().find(|t| t.element == "handle").unwrap();
    assert_eq!(handle.calls, 1);
    assert_eq!(handle.total_inclusive, 100);
    assert_eq!(handle.total_exclusive, 60);

    let query = totals.iter().find(|t| t.element == "query").unwrap();
    assert_eq!(query.calls, 2);
    assert_eq!(query.total_inclusive, 40);
    assert_eq!(query.total_exclusive, 40);
    assert_eq!(totals[0].element, "handle");
}

#[test]
fn test_render_lists_every_node() {
    let profiler = recorded();
    let text = render_tree(&top_level(&profiler.recorded_records()));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("handle 100ns"));
    assert!(lines[1].starts_with("  query 20ns"));
    assert!(lines[2].starts_with("    query[users] 20ns"));
    assert!(lines[3].starts_with("  query 20ns"));
    assert!(lines[4].starts_with("    query[orders] 20ns"));
}
