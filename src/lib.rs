//! markprof: in-process invocation profiler.
//!
//! Instrumented code brackets regions with [`begin_mark`] / [`end_mark`]. While
//! recording is enabled each call stack (thread) builds a tree of invocation
//! nodes with inclusive and exclusive timings, or, when recording to a file,
//! streams raw mark events to a background writer for later replay.
//!
//! # Marks
//!
//! - A mark is an element name plus an optional instance key. A keyed mark
//!   always nests inside a generalized (key-less) twin of the same element.
//! - Settings decide per element whether a mark is recorded, folded into its
//!   caller (`ignoremark`) or recorded without its key (`ignoreinvocation`).
//! - Re-entrant marks on the same stack increment a recursion counter on the
//!   outermost node.
//!
//! # Lifecycle
//!
//! Recording starts with [`Profiler::start_recording`] and stops with
//! [`Profiler::end_recording`] or when the configured timeout elapses. Marks
//! issued while disabled return immediately.

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod profiler;
pub mod report;
pub mod scheduler;
pub mod snapshot;
pub mod telemetry;
pub mod time;
pub mod tree;
pub mod writer;

use std::sync::OnceLock;

pub use config::{FilterMode, ProfilerSettings};
pub use error::{ConfigError, ProfilerError, SnapshotError};
pub use event::MarkEvent;
pub use filter::{ExcludeFilter, MarkPolicy};
pub use profiler::{MarkGuard, Profiler};
pub use snapshot::ReplaySummary;
pub use tree::{InvocationNode, InvocationRecord};
pub use writer::WriterStats;

static GLOBAL: OnceLock<Profiler> = OnceLock::new();

/// Process-wide profiler, created on first use from discovered settings.
pub fn global() -> &'static Profiler {
    GLOBAL.get_or_init(|| Profiler::new(ProfilerSettings::discover()))
}

/// Install `profiler` as the process-wide instance.
///
/// Must happen before the first call to [`global`]; otherwise the rejected
/// profiler is handed back.
pub fn install(profiler: Profiler) -> Result<(), Profiler> {
    GLOBAL.set(profiler)
}

/// Open a mark on the process-wide profiler.
pub fn begin_mark(element: &str, instance_key: Option<&str>) {
    global().begin_mark(element, instance_key);
}

/// Close a mark on the process-wide profiler.
pub fn end_mark(element: &str, instance_key: Option<&str>) {
    global().end_mark(element, instance_key);
}
