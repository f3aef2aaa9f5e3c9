//! Profiler facade and recording state machine.
//!
//! `DISABLED -> ENABLED` via [`Profiler::start_recording`], and back via
//! [`Profiler::end_recording`] or the recording timeout. Mark calls made while
//! disabled return immediately.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::{ProfilerSettings, OUTPUT_ENV};
use crate::error::{ProfilerError, SnapshotError};
use crate::event::MarkEvent;
use crate::filter::{ExcludeFilter, MarkPolicy};
use crate::scheduler::TimeoutScheduler;
use crate::snapshot::{self, MarkSink, ReplaySummary, SnapshotCodec};
use crate::time::{resolve_time_source, TimeSource};
use crate::tree::{current_context, InvocationNode, InvocationRecord, InvocationTracker};
use crate::writer::{AsyncMarkWriter, WriterStats};

struct ProfilerInner {
    clock: Box<dyn TimeSource>,
    filter: RwLock<ExcludeFilter>,
    enabled: AtomicBool,
    enabled_since: Mutex<Option<Instant>>,
    writer: RwLock<Option<Arc<AsyncMarkWriter>>>,
    tracker: InvocationTracker,
    timeout: TimeoutScheduler,
}

/// In-process invocation profiler.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Profiler {
    inner: Arc<ProfilerInner>,
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiler")
            .field("enabled", &self.is_enabled())
            .field("clock", &self.inner.clock.name())
            .field("running", &self.count_running())
            .field("recorded", &self.count_recorded())
            .finish()
    }
}

impl Profiler {
    /// Build a disabled profiler using the best available clock.
    pub fn new(settings: ProfilerSettings) -> Self {
        Self::with_time_source(settings, resolve_time_source())
    }

    pub fn with_time_source(settings: ProfilerSettings, clock: Box<dyn TimeSource>) -> Self {
        Self {
            inner: Arc::new(ProfilerInner {
                clock,
                filter: RwLock::new(ExcludeFilter::new(settings)),
                enabled: AtomicBool::new(false),
                enabled_since: Mutex::new(None),
                writer: RwLock::new(None),
                tracker: InvocationTracker::new(),
                timeout: TimeoutScheduler::new(),
            }),
        }
    }

    // ---- mark entry points ------------------------------------------------

    /// Open a mark on the calling thread.
    pub fn begin_mark(&self, element: &str, instance_key: Option<&str>) {
        if self.is_enabled() {
            let now = self.inner.clock.now();
            self.apply(&current_context(), element, instance_key, now, true);
        }
    }

    /// Close a mark on the calling thread.
    pub fn end_mark(&self, element: &str, instance_key: Option<&str>) {
        if self.is_enabled() {
            let now = self.inner.clock.now();
            self.apply(&current_context(), element, instance_key, now, false);
        }
    }

    /// [`Self::begin_mark`] with an explicit timestamp.
    pub fn begin_mark_at(&self, element: &str, instance_key: Option<&str>, time: u64) {
        if self.is_enabled() {
            self.apply(&current_context(), element, instance_key, time, true);
        }
    }

    /// [`Self::end_mark`] with an explicit timestamp.
    pub fn end_mark_at(&self, element: &str, instance_key: Option<&str>, time: u64) {
        if self.is_enabled() {
            self.apply(&current_context(), element, instance_key, time, false);
        }
    }

    /// Open a mark that closes when the returned guard drops.
    pub fn mark<'a>(&'a self, element: &'a str, instance_key: Option<&'a str>) -> MarkGuard<'a> {
        self.begin_mark(element, instance_key);
        MarkGuard {
            profiler: self,
            element,
            instance_key,
        }
    }

    fn apply(&self, context: &str, element: &str, instance_key: Option<&str>, time: u64, begin: bool) {
        let policy = self.inner.filter.read().resolve(element);
        let instance_key = match policy {
            MarkPolicy::IgnoreMark => {
                if begin {
                    self.inner.tracker.pause_top(context, time);
                } else {
                    self.inner.tracker.resume_top(context, time);
                }
                return;
            }
            MarkPolicy::IgnoreInstance => None,
            MarkPolicy::Passthrough => instance_key,
        };

        if let Some(writer) = self.inner.writer.read().as_ref() {
            let event = if begin {
                MarkEvent::begin(element, instance_key, time, context)
            } else {
                MarkEvent::end(element, instance_key, time, context)
            };
            writer.enqueue(event);
            return;
        }

        if begin {
            self.inner.tracker.begin_in(context, element, instance_key, time);
        } else {
            self.inner.tracker.end_in(context, element, instance_key, time);
        }
    }

    // ---- recording lifecycle ----------------------------------------------

    /// Enable recording. With `output`, events are persisted there instead of
    /// building trees.
    pub fn start_recording(&self, output: Option<&Path>) -> Result<(), ProfilerError> {
        let writer = match output {
            Some(path) => match AsyncMarkWriter::create(path) {
                Ok(writer) => Some(Arc::new(writer)),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to start mark writer");
                    return Err(e);
                }
            },
            None => None,
        };
        self.detach_writer();
        *self.inner.writer.write() = writer;
        self.start_session(true);
        Ok(())
    }

    /// Start recording to the file named by `MARKPROF_OUTPUT`, if set.
    pub fn start_recording_from_env(&self) -> Result<(), ProfilerError> {
        match std::env::var_os(OUTPUT_ENV) {
            Some(path) if !path.is_empty() => self.start_recording(Some(Path::new(&path))),
            _ => self.start_recording(None),
        }
    }

    fn start_session(&self, arm_timeout: bool) {
        *self.inner.enabled_since.lock() = Some(Instant::now());
        self.inner.enabled.store(true, Ordering::SeqCst);

        let timeout_secs = self.inner.filter.read().settings().timeout_secs;
        if !arm_timeout || timeout_secs < 0 {
            self.inner.timeout.cancel();
        } else {
            let weak = Arc::downgrade(&self.inner);
            let armed = self.inner.timeout.arm(Duration::from_secs(timeout_secs as u64), move || {
                fire_timeout(&weak, timeout_secs as u64);
            });
            if let Err(e) = armed {
                tracing::error!(error = %e, "Failed to arm recording timeout");
            }
        }
        tracing::info!(timeout_secs, "Recording started");
    }

    /// Disable recording and discard open invocations.
    ///
    /// If a writer is attached, blocks until it has drained and exited.
    pub fn end_recording(&self) -> Option<WriterStats> {
        self.inner.enabled.store(false, Ordering::SeqCst);
        *self.inner.enabled_since.lock() = None;
        self.inner.timeout.cancel();
        self.inner.tracker.discard_running();
        let stats = self.detach_writer();
        tracing::info!(recorded = self.count_recorded(), "Recording ended");
        stats
    }

    fn detach_writer(&self) -> Option<WriterStats> {
        let writer = self.inner.writer.write().take()?;
        writer.stop()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Whether events currently go to an attached writer.
    pub fn is_persisting(&self) -> bool {
        self.inner.writer.read().is_some()
    }

    /// Seconds until the timeout disables recording, or `-1` when disabled
    /// or unlimited.
    pub fn remaining_timeout(&self) -> i64 {
        let timeout_secs = self.inner.filter.read().settings().timeout_secs;
        if !self.is_enabled() || timeout_secs < 0 {
            return -1;
        }
        match *self.inner.enabled_since.lock() {
            Some(since) => (timeout_secs - since.elapsed().as_secs() as i64).max(0),
            None => -1,
        }
    }

    pub fn is_high_resolution_clock(&self) -> bool {
        self.inner.clock.is_high_resolution()
    }

    // ---- settings ---------------------------------------------------------

    /// Replace the include/exclude settings. Applies to subsequent marks; the
    /// timeout applies from the next session.
    pub fn load_settings(&self, settings: ProfilerSettings) {
        *self.inner.filter.write() = ExcludeFilter::new(settings);
    }

    pub fn settings(&self) -> ProfilerSettings {
        self.inner.filter.read().settings().clone()
    }

    // ---- recorded state ---------------------------------------------------

    /// Clear recorded invocations. Open invocations are kept.
    pub fn reset(&self) {
        self.inner.tracker.store().clear();
    }

    pub fn recorded_invocations(&self) -> Vec<Arc<InvocationNode>> {
        self.inner.tracker.store().get_all()
    }

    pub fn set_recorded_invocations(&self, invocations: Vec<Arc<InvocationNode>>) {
        self.inner.tracker.store().set_all(invocations);
    }

    /// Owned copies of every recorded invocation.
    pub fn recorded_records(&self) -> Vec<InvocationRecord> {
        self.inner.tracker.store().records()
    }

    /// Recorded invocations that are call stack roots.
    pub fn recorded_roots(&self) -> Vec<Arc<InvocationNode>> {
        self.inner.tracker.store().roots()
    }

    pub fn count_running(&self) -> usize {
        self.inner.tracker.count_running()
    }

    pub fn count_recorded(&self) -> usize {
        self.inner.tracker.store().len()
    }

    // ---- snapshots --------------------------------------------------------

    /// Replay a snapshot file into a fresh recorded store.
    ///
    /// Fails only if the file cannot be opened; decode errors abort the replay
    /// and are reported in the summary.
    pub fn load_snapshot(&self, path: &Path) -> Result<ReplaySummary, ProfilerError> {
        let file = std::fs::File::open(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to open snapshot");
            SnapshotError::Io(e)
        })?;
        let expected = snapshot::read_count(path);
        if expected.is_none() {
            tracing::debug!(path = %path.display(), "No count file, replay progress disabled");
        }
        Ok(self.load_snapshot_from_reader(BufReader::new(file), expected))
    }

    /// Replay a snapshot stream into a fresh recorded store.
    pub fn load_snapshot_from_reader<R: Read>(
        &self,
        reader: R,
        expected_total: Option<u64>,
    ) -> ReplaySummary {
        self.end_recording();
        self.reset();
        self.start_session(false);
        let summary = snapshot::replay(reader, self, expected_total);
        self.end_recording();
        summary
    }

    /// Write the recorded store as a single tree-collection record.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize, ProfilerError> {
        let records = self.recorded_records();
        let mut out = BufWriter::new(std::fs::File::create(path)?);
        SnapshotCodec::write_trees(&mut out, &records)?;
        out.flush()?;
        snapshot::write_count(path, 1)?;
        tracing::info!(path = %path.display(), invocations = records.len(), "Snapshot saved");
        Ok(records.len())
    }
}

impl MarkSink for Profiler {
    fn apply_event(&self, event: &MarkEvent) {
        if self.is_enabled() {
            self.apply(
                &event.thread,
                &event.element,
                event.instance_key.as_deref(),
                event.timestamp,
                event.is_begin,
            );
        }
    }

    fn replace_recorded(&self, trees: Vec<InvocationRecord>) {
        self.inner.tracker.store().set_records(&trees);
    }
}

/// Timer task: disable recording if the window since the last enable has
/// really elapsed.
fn fire_timeout(inner: &Weak<ProfilerInner>, timeout_secs: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let elapsed = match *inner.enabled_since.lock() {
        Some(since) => since.elapsed(),
        None => return,
    };
    if elapsed < Duration::from_secs(timeout_secs) {
        tracing::debug!("Stale recording timeout ignored");
        return;
    }
    if inner.enabled.swap(false, Ordering::SeqCst) {
        crate::telemetry::record_timeout_fired();
        tracing::info!(timeout_secs, "Recording timeout reached, recording disabled");
    }
}

/// Closes its mark when dropped.
#[must_use = "dropping the guard immediately ends the mark"]
pub struct MarkGuard<'a> {
    profiler: &'a Profiler,
    element: &'a str,
    instance_key: Option<&'a str>,
}

impl Drop for MarkGuard<'_> {
    fn drop(&mut self) {
        self.profiler.end_mark(self.element, self.instance_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> Profiler {
        let profiler = Profiler::new(ProfilerSettings::default());
        profiler.start_recording(None).unwrap();
        profiler
    }

    #[test]
    fn test_disabled_profiler_ignores_marks() {
        let profiler = Profiler::new(ProfilerSettings::default());
        profiler.begin_mark("a", None);
        assert_eq!(profiler.count_running(), 0);
        assert_eq!(profiler.remaining_timeout(), -1);
    }

    #[test]
    fn test_guard_closes_mark() {
        let profiler = enabled();
        {
            let _guard = profiler.mark("scope", None);
            assert_eq!(profiler.count_running(), 1);
        }
        assert_eq!(profiler.count_running(), 0);
        assert_eq!(profiler.count_recorded(), 1);
    }

    #[test]
    fn test_end_recording_discards_open_marks() {
        let profiler = enabled();
        profiler.begin_mark_at("done", None, 0);
        profiler.end_mark_at("done", None, 5);
        profiler.begin_mark_at("open", None, 6);
        assert!(profiler.end_recording().is_none());
        assert!(!profiler.is_enabled());
        assert_eq!(profiler.count_running(), 0);
        assert_eq!(profiler.count_recorded(), 1);
    }

    #[test]
    fn test_reset_clears_only_recorded() {
        let profiler = enabled();
        profiler.begin_mark_at("a", None, 0);
        profiler.end_mark_at("a", None, 1);
        profiler.begin_mark_at("b", None, 2);
        profiler.reset();
        assert_eq!(profiler.count_recorded(), 0);
        assert_eq!(profiler.count_running(), 1);
    }

    #[test]
    fn test_remaining_timeout_counts_down_from_setting() {
        let settings = ProfilerSettings {
            timeout_secs: 60,
            ..ProfilerSettings::default()
        };
        let profiler = Profiler::new(settings);
        profiler.start_recording(None).unwrap();
        let remaining = profiler.remaining_timeout();
        assert!((59..=60).contains(&remaining));
        profiler.end_recording();
        assert_eq!(profiler.remaining_timeout(), -1);
    }
}
