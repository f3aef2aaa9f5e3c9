//! Text rendering and per-mark aggregation of recorded trees.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use serde::Serialize;

use crate::tree::InvocationRecord;

/// Totals for one mark element across every recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkSummary {
    pub element: String,
    pub calls: u64,
    pub total_inclusive: u64,
    pub total_exclusive: u64,
}

/// Render trees as an indented listing, one invocation per line.
///
/// Unfinished invocations show `open` in place of a duration.
pub fn render_tree(roots: &[InvocationRecord]) -> String {
    let mut out = String::new();
    for root in roots {
        render_node(&mut out, root, 0);
    }
    out
}

fn render_node(out: &mut String, record: &InvocationRecord, depth: usize) {
    let duration = match record.duration() {
        Some(ns) => format_nanos(ns),
        None => "open".to_string(),
    };
    let _ = write!(
        out,
        "{:indent$}{} {} (self {})",
        "",
        record.label(),
        duration,
        format_nanos(record.exclusive_time),
        indent = depth * 2
    );
    if depth == 0 {
        let _ = write!(out, " [{}]", record.context);
    }
    if record.recursion_counter > 1 {
        let _ = write!(out, " x{}", record.recursion_counter);
    }
    out.push('\n');
    for child in &record.children {
        render_node(out, child, depth + 1);
    }
}

/// Human-readable nanosecond duration.
pub fn format_nanos(ns: u64) -> String {
    match ns {
        0..=9_999 => format!("{ns}ns"),
        10_000..=9_999_999 => format!("{:.1}us", ns as f64 / 1_000.0),
        10_000_000..=9_999_999_999 => format!("{:.1}ms", ns as f64 / 1_000_000.0),
        _ => format!("{:.2}s", ns as f64 / 1_000_000_000.0),
    }
}

/// Drop records that also appear nested inside another record.
///
/// A recorded collection holds nested nodes next to their roots; this keeps
/// only the outermost copy of each subtree.
pub fn top_level(records: &[InvocationRecord]) -> Vec<InvocationRecord> {
    let mut nested: HashSet<Identity<'_>> = HashSet::new();
    let mut stack: Vec<&InvocationRecord> = Vec::new();
    for record in records {
        stack.extend(record.children.iter());
    }
    while let Some(record) = stack.pop() {
        nested.insert(Identity::of(record));
        stack.extend(record.children.iter());
    }
    records
        .iter()
        .filter(|record| !nested.contains(&Identity::of(record)))
        .cloned()
        .collect()
}

#[derive(PartialEq, Eq, Hash)]
struct Identity<'a> {
    context: &'a str,
    element: &'a str,
    instance_key: Option<&'a str>,
    start_time: u64,
    end_time: Option<u64>,
}

impl<'a> Identity<'a> {
    fn of(record: &'a InvocationRecord) -> Self {
        Self {
            context: &record.context,
            element: &record.element,
            instance_key: record.instance_key.as_deref(),
            start_time: record.start_time,
            end_time: record.end_time,
        }
    }
}

/// Sum calls and times per element over every node of `roots`.
///
/// Calls and inclusive time come from generalized (key-less) nodes only, so a
/// keyed invocation and its twin count once. A recursive re-entry counts as a
/// call but adds no inclusive time, since the outermost invocation of that
/// element already covers it. Exclusive time is summed over every node, since
/// the twin is paused while its keyed child runs. Sorted by exclusive time,
/// largest first, then by element name.
pub fn aggregate(roots: &[InvocationRecord]) -> Vec<MarkSummary> {
    let mut totals: HashMap<&str, MarkSummary> = HashMap::new();
    let mut open: Vec<&str> = Vec::new();
    for root in roots {
        accumulate(&mut totals, &mut open, root);
    }

    let mut summaries: Vec<MarkSummary> = totals.into_values().collect();
    summaries.sort_by(|a, b| {
        b.total_exclusive
            .cmp(&a.total_exclusive)
            .then_with(|| a.element.cmp(&b.element))
    });
    summaries
}

/// Add `record` and its subtree; `open` holds the elements of its ancestors.
fn accumulate<'a>(
    totals: &mut HashMap<&'a str, MarkSummary>,
    open: &mut Vec<&'a str>,
    record: &'a InvocationRecord,
) {
    let entry = totals.entry(&record.element).or_insert_with(|| MarkSummary {
        element: record.element.clone(),
        calls: 0,
        total_inclusive: 0,
        total_exclusive: 0,
    });
    entry.total_exclusive += record.exclusive_time;
    if record.instance_key.is_none() {
        entry.calls += 1;
        if !open.contains(&record.element.as_str()) {
            entry.total_inclusive += record.duration().unwrap_or(0);
        }
    }
    open.push(&record.element);
    for child in &record.children {
        accumulate(totals, open, child);
    }
    open.pop();
}
