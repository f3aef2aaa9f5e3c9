//! Raw begin/end events exchanged with the writer and stored in snapshots.

use serde::{Deserialize, Serialize};

/// One begin or end call, as observed at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkEvent {
    pub element: String,
    pub instance_key: Option<String>,
    /// Nanosecond timestamp from the profiler's time source.
    pub timestamp: u64,
    pub is_begin: bool,
    /// Call stack (thread) the event was produced on.
    pub thread: String,
}

impl MarkEvent {
    pub fn begin(element: &str, instance_key: Option<&str>, timestamp: u64, thread: &str) -> Self {
        Self::new(element, instance_key, timestamp, true, thread)
    }

    pub fn end(element: &str, instance_key: Option<&str>, timestamp: u64, thread: &str) -> Self {
        Self::new(element, instance_key, timestamp, false, thread)
    }

    fn new(
        element: &str,
        instance_key: Option<&str>,
        timestamp: u64,
        is_begin: bool,
        thread: &str,
    ) -> Self {
        Self {
            element: element.to_string(),
            instance_key: instance_key.map(str::to_string),
            timestamp,
            is_begin,
            thread: thread.to_string(),
        }
    }
}
