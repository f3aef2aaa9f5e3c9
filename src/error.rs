//! Error types for markprof.
//!
//! Only lifecycle operations (settings, snapshot I/O, writer startup) are
//! fallible. The mark hot path never returns these to instrumented callers.

use thiserror::Error;

/// Errors raised while loading or validating profiler settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors raised while encoding or decoding snapshot streams.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown record tag: 0x{0:02x}")]
    UnknownTag(u8),

    #[error("Record too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Record truncated: {0}")]
    Truncated(&'static str),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Tree collection decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level profiler errors.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Failed to spawn {thread} thread: {reason}")]
    ThreadSpawn { thread: &'static str, reason: String },
}

impl SnapshotError {
    /// True when the error is a clean end of stream at a record boundary.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
