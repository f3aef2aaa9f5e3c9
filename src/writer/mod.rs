//! Background persistence of raw mark events.
//!
//! While a writer is attached, begin/end calls skip tree building and only
//! enqueue a [`MarkEvent`]. A dedicated thread drains the unbounded queue into
//! a snapshot stream and writes the final count file on shutdown.

mod depth;

pub use depth::{DepthMonitor, DepthTransition, RECOVER_DEPTH, WARN_DEPTH};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{ProfilerError, SnapshotError};
use crate::event::MarkEvent;
use crate::snapshot::{write_count, SnapshotCodec};

/// How long the consumer blocks before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Join polling period while stopping.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Interval between "still waiting" logs while stopping.
const JOIN_LOG_INTERVAL: Duration = Duration::from_secs(2);

const THREAD_NAME: &str = "markprof-writer";

/// Totals reported when the writer thread exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub per_mark: BTreeMap<String, u64>,
    pub depth_warnings: u32,
    pub depth_recoveries: u32,
    /// Error that terminated the writer early, if any.
    pub failure: Option<String>,
}

/// Handle to the background writer thread.
pub struct AsyncMarkWriter {
    sender: Sender<MarkEvent>,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<WriterStats>>>,
    output: Option<PathBuf>,
}

impl std::fmt::Debug for AsyncMarkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMarkWriter")
            .field("output", &self.output)
            .field("pending", &self.pending())
            .finish()
    }
}

impl AsyncMarkWriter {
    /// Start a writer persisting to `path`, with the count file beside it.
    pub fn create(path: &Path) -> Result<Self, ProfilerError> {
        let file = File::create(path)?;
        let mut writer = Self::spawn(Box::new(BufWriter::new(file)), Some(path.to_path_buf()))?;
        writer.output = Some(path.to_path_buf());
        tracing::info!(path = %path.display(), "Mark writer started");
        Ok(writer)
    }

    /// Start a writer over an arbitrary sink.
    ///
    /// `count_for` names the stream whose count file is written on exit.
    pub fn spawn(
        sink: Box<dyn Write + Send>,
        count_for: Option<PathBuf>,
    ) -> Result<Self, ProfilerError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || consume(receiver, stop_flag, sink, count_for))
            .map_err(|e| ProfilerError::ThreadSpawn {
                thread: THREAD_NAME,
                reason: e.to_string(),
            })?;

        Ok(Self {
            sender,
            stop,
            handle: Mutex::new(Some(handle)),
            output: None,
        })
    }

    /// Queue an event. Never blocks on I/O.
    pub fn enqueue(&self, event: MarkEvent) {
        // Fails only once the writer has terminated; the event is dropped.
        let _ = self.sender.send(event);
    }

    /// Events waiting to be written.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Whether the writer thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Signal the writer to drain and exit, then wait for it.
    ///
    /// Waits without a deadline, logging periodically. Returns `None` if the
    /// writer was already stopped or its thread panicked.
    pub fn stop(&self) -> Option<WriterStats> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.handle.lock().take()?;

        let started = Instant::now();
        let mut last_log = started;
        while !handle.is_finished() {
            thread::sleep(JOIN_POLL);
            if last_log.elapsed() >= JOIN_LOG_INTERVAL {
                tracing::info!(
                    pending = self.pending(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Waiting for mark writer to finish"
                );
                last_log = Instant::now();
            }
        }

        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                tracing::error!("Mark writer thread panicked");
                None
            }
        }
    }
}

impl Drop for AsyncMarkWriter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Consumer loop run on the writer thread.
fn consume(
    receiver: Receiver<MarkEvent>,
    stop: Arc<AtomicBool>,
    mut sink: Box<dyn Write + Send>,
    count_for: Option<PathBuf>,
) -> WriterStats {
    let mut stats = WriterStats::default();
    let mut monitor = DepthMonitor::default();

    let result: Result<(), SnapshotError> = loop {
        if stop.load(Ordering::SeqCst) {
            // Stop requested: drain what is already queued, then exit.
            let drained = receiver
                .try_iter()
                .try_for_each(|event| write_one(&mut sink, &event, &mut stats));
            break drained;
        }
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                if let Err(e) = write_one(&mut sink, &event, &mut stats) {
                    break Err(e);
                }
                let depth = receiver.len();
                crate::telemetry::record_writer_depth(depth);
                match monitor.observe(depth) {
                    Some(DepthTransition::Warned { depth }) => {
                        stats.depth_warnings += 1;
                        tracing::warn!(depth, threshold = WARN_DEPTH, "Mark writer falling behind");
                    }
                    Some(DepthTransition::Recovered { depth }) => {
                        stats.depth_recoveries += 1;
                        tracing::debug!(depth, threshold = RECOVER_DEPTH, "Mark writer caught up");
                    }
                    None => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break Ok(()),
        }
    };
    drop(receiver);

    if let Err(e) = &result {
        tracing::error!(error = %e, written = stats.written, "Mark writer failed, stopping");
        stats.failure = Some(e.to_string());
    }
    if let Err(e) = sink.flush() {
        tracing::error!(error = %e, "Failed to flush mark stream");
        stats.failure.get_or_insert_with(|| e.to_string());
    }
    drop(sink);

    if let Some(path) = &count_for {
        if let Err(e) = write_count(path, stats.written) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write mark count file");
        }
    }

    for (element, count) in &stats.per_mark {
        tracing::info!(element = %element, count, "Marks written");
    }
    tracing::info!(total = stats.written, "Mark writer stopped");
    stats
}

fn write_one(
    sink: &mut Box<dyn Write + Send>,
    event: &MarkEvent,
    stats: &mut WriterStats,
) -> Result<(), SnapshotError> {
    SnapshotCodec::write_event(sink, event)?;
    stats.written += 1;
    *stats.per_mark.entry(event.element.clone()).or_insert(0) += 1;
    crate::telemetry::record_event_written();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stop_drains_queue() {
        let buf = SharedBuf::default();
        let writer = AsyncMarkWriter::spawn(Box::new(buf.clone()), None).unwrap();
        for i in 0..100 {
            writer.enqueue(MarkEvent::begin("a", None, i, "main"));
            writer.enqueue(MarkEvent::end("b", None, i, "main"));
        }
        let stats = writer.stop().unwrap();
        assert_eq!(stats.written, 200);
        assert_eq!(stats.per_mark.get("a"), Some(&100));
        assert_eq!(stats.per_mark.get("b"), Some(&100));
        assert!(stats.failure.is_none());
        assert!(!buf.0.lock().is_empty());
        assert!(writer.stop().is_none());
    }

    #[test]
    fn test_sink_failure_terminates_writer_only() {
        let writer = AsyncMarkWriter::spawn(Box::new(FailingSink), None).unwrap();
        writer.enqueue(MarkEvent::begin("a", None, 0, "main"));
        let stats = writer.stop().unwrap();
        assert_eq!(stats.written, 0);
        assert!(stats.failure.unwrap().contains("disk full"));
        // Enqueue after failure is silently dropped.
        writer.enqueue(MarkEvent::end("a", None, 1, "main"));
    }
}
