//! Telemetry for markprof itself: log subscriber setup and metrics.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat, LOG_FORMAT_ENV, LOG_LEVEL_ENV};
pub use metrics::{
    record_event_written, record_invocation_recorded, record_replay_events, record_timeout_fired,
    record_writer_depth,
};
