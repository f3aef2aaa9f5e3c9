//! Replay of snapshot streams through the begin/end entry points.

use std::io::Read;

use crate::event::MarkEvent;
use crate::tree::InvocationRecord;

use super::codec::{SnapshotCodec, SnapshotRecord};

/// Receiver of replayed records.
pub trait MarkSink {
    /// Apply one historical event with its original timestamp.
    fn apply_event(&self, event: &MarkEvent);

    /// Replace the recorded store with a whole tree collection.
    fn replace_recorded(&self, trees: Vec<InvocationRecord>);
}

/// Outcome of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: u64,
    pub trees: u64,
    /// Reason the replay stopped before end of stream.
    pub aborted: Option<String>,
}

impl ReplaySummary {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn records(&self) -> u64 {
        self.events + self.trees
    }
}

/// Logs progress at every 10% step when the total is known.
struct Progress {
    total: Option<u64>,
    next_step: u64,
}

impl Progress {
    fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            next_step: 10,
        }
    }

    fn observe(&mut self, done: u64) {
        let Some(total) = self.total else {
            return;
        };
        let percent = done.saturating_mul(100) / total;
        if percent >= self.next_step {
            tracing::info!(done, total, percent, "Snapshot replay progress");
            self.next_step = (percent / 10 + 1) * 10;
        }
    }
}

/// Feed every record of `reader` into `sink` until end of stream.
///
/// Decode failures stop the replay; records applied before the failure stay
/// applied.
pub fn replay<R: Read, S: MarkSink + ?Sized>(
    mut reader: R,
    sink: &S,
    expected_total: Option<u64>,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let mut progress = Progress::new(expected_total);

    loop {
        match SnapshotCodec::read_record(&mut reader) {
            Ok(Some(SnapshotRecord::Event(event))) => {
                sink.apply_event(&event);
                summary.events += 1;
            }
            Ok(Some(SnapshotRecord::Trees(trees))) => {
                sink.replace_recorded(trees);
                summary.trees += 1;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, records = summary.records(), "Snapshot replay aborted");
                summary.aborted = Some(e.to_string());
                break;
            }
        }
        progress.observe(summary.records());
    }

    crate::telemetry::record_replay_events(summary.events);
    tracing::info!(
        events = summary.events,
        trees = summary.trees,
        complete = summary.is_complete(),
        "Snapshot replay finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<MarkEvent>>,
        trees: Mutex<Vec<InvocationRecord>>,
    }

    impl MarkSink for Collect {
        fn apply_event(&self, event: &MarkEvent) {
            self.events.lock().push(event.clone());
        }

        fn replace_recorded(&self, trees: Vec<InvocationRecord>) {
            *self.trees.lock() = trees;
        }
    }

    #[test]
    fn test_replay_stops_on_corruption_keeping_prefix() {
        let mut bytes = Vec::new();
        SnapshotCodec::write_event(&mut bytes, &MarkEvent::begin("a", None, 1, "main")).unwrap();
        SnapshotCodec::write_event(&mut bytes, &MarkEvent::end("a", None, 2, "main")).unwrap();
        bytes.push(0xee);

        let sink = Collect::default();
        let summary = replay(bytes.as_slice(), &sink, None);
        assert_eq!(summary.events, 2);
        assert!(summary.aborted.is_some());
        assert_eq!(sink.events.lock().len(), 2);
    }

    #[test]
    fn test_progress_steps() {
        let mut progress = Progress::new(Some(20));
        progress.observe(1);
        assert_eq!(progress.next_step, 10);
        progress.observe(5);
        assert_eq!(progress.next_step, 30);
        progress.observe(20);
        assert_eq!(progress.next_step, 110);
    }
}
