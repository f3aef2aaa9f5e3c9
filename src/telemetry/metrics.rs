//! Metric recording through the `metrics` facade.
//!
//! Without an installed recorder every call here is a no-op.

/// Current number of events waiting in the writer queue.
pub fn record_writer_depth(depth: usize) {
    ::metrics::gauge!("markprof_writer_queue_depth").set(depth as f64);
}

/// One event persisted by the writer.
pub fn record_event_written() {
    ::metrics::counter!("markprof_events_written_total").increment(1);
}

/// One invocation moved into the recorded store.
pub fn record_invocation_recorded() {
    ::metrics::counter!("markprof_invocations_recorded_total").increment(1);
}

/// Events replayed from a snapshot.
pub fn record_replay_events(count: u64) {
    ::metrics::counter!("markprof_replay_events_total").increment(count);
}

/// Recording disabled by the timeout scheduler.
pub fn record_timeout_fired() {
    ::metrics::counter!("markprof_timeouts_fired_total").increment(1);
}
