//! Clock selection for mark timestamps.
//!
//! The clock is resolved once when a profiler is built. All timestamps are
//! nanoseconds as `u64`; only differences between them are meaningful.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of mark timestamps.
pub trait TimeSource: Send + Sync {
    /// Current time in nanoseconds.
    fn now(&self) -> u64;

    /// Whether readings have sub-millisecond resolution.
    fn is_high_resolution(&self) -> bool;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Process-wide epoch so monotonic readings fit in a `u64`.
static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// High-resolution monotonic clock backed by `Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl TimeSource for MonotonicClock {
    fn now(&self) -> u64 {
        epoch().elapsed().as_nanos() as u64
    }

    fn is_high_resolution(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "monotonic"
    }
}

/// Wall clock truncated to milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoarseClock;

impl TimeSource for CoarseClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64 * 1_000_000)
            .unwrap_or(0)
    }

    fn is_high_resolution(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "coarse"
    }
}

/// Degenerate clock used when no usable clock exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroClock;

impl TimeSource for ZeroClock {
    fn now(&self) -> u64 {
        0
    }

    fn is_high_resolution(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "zero"
    }
}

/// Pick the best available clock.
///
/// Prefers the monotonic clock, falls back to the coarse wall clock, and as a
/// last resort returns [`ZeroClock`] so profiler construction never fails.
pub fn resolve_time_source() -> Box<dyn TimeSource> {
    let mono = MonotonicClock;
    let first = mono.now();
    let second = mono.now();
    if second >= first {
        tracing::debug!(clock = mono.name(), "Resolved mark time source");
        return Box::new(mono);
    }

    tracing::warn!("Monotonic clock went backwards, falling back to coarse clock");
    if SystemTime::now().duration_since(UNIX_EPOCH).is_ok() {
        return Box::new(CoarseClock);
    }

    tracing::error!(fatal = true, "No usable clock source, mark times will be zero");
    Box::new(ZeroClock)
}
