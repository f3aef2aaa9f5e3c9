// Copyright 2024-2026 markprof Contributors
// SPDX-License-Identifier: Apache-2.0

//! Replay CLI subcommand: rebuild trees from a snapshot file and print them.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::ProfilerSettings;
use crate::profiler::Profiler;
use crate::report::{self, format_nanos, MarkSummary};

use super::{EXIT_FAILURE, EXIT_OK, EXIT_PARTIAL};

/// Parsed `replay` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
    pub snapshot: PathBuf,
    pub tree: bool,
    pub json: bool,
    /// Optional settings file applied while replaying.
    pub settings: Option<PathBuf>,
}

impl ReplayOptions {
    /// Parse the arguments following `replay`.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut snapshot = None;
        let mut tree = false;
        let mut json = false;
        let mut settings = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--tree" => tree = true,
                "--json" => json = true,
                "--settings" => match iter.next() {
                    Some(path) => settings = Some(PathBuf::from(path)),
                    None => return Err("--settings requires a path".to_string()),
                },
                flag if flag.starts_with("--") => return Err(format!("Unknown option: {flag}")),
                path if snapshot.is_none() => snapshot = Some(PathBuf::from(path)),
                extra => return Err(format!("Unexpected argument: {extra}")),
            }
        }

        Ok(Self {
            snapshot: snapshot.ok_or_else(|| "Missing snapshot path".to_string())?,
            tree,
            json,
            settings,
        })
    }
}

/// Replay a snapshot and print per-mark totals (and optionally the trees).
///
/// Returns 0 on success, 1 if the snapshot cannot be read, 2 if replay
/// stopped early on a corrupt record.
pub fn run_replay(options: &ReplayOptions) -> i32 {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_replay_to(options, &mut out)
}

pub(crate) fn run_replay_to<W: Write>(options: &ReplayOptions, out: &mut W) -> i32 {
    let settings = match &options.settings {
        Some(path) => match ProfilerSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Failed to load settings {}: {}", path.display(), e);
                return EXIT_FAILURE;
            }
        },
        None => ProfilerSettings::default(),
    };

    let profiler = Profiler::new(settings);
    let summary = match profiler.load_snapshot(&options.snapshot) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Failed to load snapshot {}: {}", options.snapshot.display(), e);
            return EXIT_FAILURE;
        }
    };

    let roots = report::top_level(&profiler.recorded_records());
    let totals = report::aggregate(&roots);

    let written = if options.json {
        print_json(out, &totals)
    } else {
        print_text(out, &options.snapshot, summary.events, summary.trees, &totals).and_then(|()| {
            if options.tree {
                write!(out, "\n{}", report::render_tree(&roots))
            } else {
                Ok(())
            }
        })
    };
    if let Err(e) = written {
        eprintln!("Failed to write report: {}", e);
        return EXIT_FAILURE;
    }

    match summary.aborted {
        Some(reason) => {
            eprintln!("WARNING: replay stopped early: {}", reason);
            EXIT_PARTIAL
        }
        None => EXIT_OK,
    }
}

fn print_text<W: Write>(
    out: &mut W,
    snapshot: &Path,
    events: u64,
    trees: u64,
    totals: &[MarkSummary],
) -> std::io::Result<()> {
    writeln!(
        out,
        "{}: {} events, {} tree collections",
        snapshot.display(),
        events,
        trees
    )?;
    writeln!(out, "{:<40} {:>8} {:>12} {:>12}", "MARK", "CALLS", "TOTAL", "SELF")?;
    for total in totals {
        writeln!(
            out,
            "{:<40} {:>8} {:>12} {:>12}",
            total.element,
            total.calls,
            format_nanos(total.total_inclusive),
            format_nanos(total.total_exclusive)
        )?;
    }
    Ok(())
}

fn print_json<W: Write>(out: &mut W, totals: &[MarkSummary]) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(totals)?;
    writeln!(out, "{json}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MarkEvent;
    use crate::snapshot::SnapshotCodec;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let options = ReplayOptions::parse(&args(&["marks.bin", "--tree"])).unwrap();
        assert_eq!(options.snapshot, PathBuf::from("marks.bin"));
        assert!(options.tree);
        assert!(!options.json);
        assert!(options.settings.is_none());

        assert!(ReplayOptions::parse(&args(&["--tree"])).is_err());
        assert!(ReplayOptions::parse(&args(&["a", "b"])).is_err());
        assert!(ReplayOptions::parse(&args(&["a", "--bogus"])).is_err());
        assert!(ReplayOptions::parse(&args(&["a", "--settings"])).is_err());
    }

    #[test]
    fn test_replay_prints_totals_and_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marks.bin");
        let mut bytes = Vec::new();
        for event in [
            MarkEvent::begin("outer", None, 0, "main"),
            MarkEvent::begin("inner", None, 10, "main"),
            MarkEvent::end("inner", None, 30, "main"),
            MarkEvent::end("outer", None, 50, "main"),
        ] {
            SnapshotCodec::write_event(&mut bytes, &event).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();

        let options = ReplayOptions::parse(&args(&[path.to_str().unwrap(), "--tree"])).unwrap();
        let mut out = Vec::new();
        assert_eq!(run_replay_to(&options, &mut out), EXIT_OK);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("4 events, 0 tree collections"));
        assert!(text.contains("outer 50ns (self 30ns) [main]"));
        assert!(text.contains("  inner 20ns (self 20ns)"));
    }

    #[test]
    fn test_replay_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = ReplayOptions::parse(&args(&[dir
            .path()
            .join("missing.bin")
            .to_str()
            .unwrap()]))
        .unwrap();
        let mut out = Vec::new();
        assert_eq!(run_replay_to(&options, &mut out), EXIT_FAILURE);
    }

    #[test]
    fn test_replay_corrupt_tail_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marks.bin");
        let mut bytes = Vec::new();
        SnapshotCodec::write_event(&mut bytes, &MarkEvent::begin("a", None, 0, "main")).unwrap();
        SnapshotCodec::write_event(&mut bytes, &MarkEvent::end("a", None, 5, "main")).unwrap();
        bytes.push(0x7f);
        std::fs::write(&path, bytes).unwrap();

        let options = ReplayOptions::parse(&args(&[path.to_str().unwrap(), "--json"])).unwrap();
        let mut out = Vec::new();
        assert_eq!(run_replay_to(&options, &mut out), EXIT_PARTIAL);
        let totals: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(totals[0]["element"], "a");
        assert_eq!(totals[0]["calls"], 1);
    }
}
