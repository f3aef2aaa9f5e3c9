//! One-shot timer used to auto-disable recording.
//!
//! Each arm spawns a short-lived thread that waits for the deadline. Re-arming
//! or cancelling bumps a generation counter, which wakes and retires any
//! earlier timer thread without running its task.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::ProfilerError;

const THREAD_NAME: &str = "markprof-timeout";

#[derive(Debug, Default)]
struct TimerShared {
    generation: Mutex<u64>,
    wake: Condvar,
}

/// Schedules a single pending task at a time.
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    shared: Arc<TimerShared>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any previously armed task.
    pub fn arm<F>(&self, delay: Duration, task: F) -> Result<(), ProfilerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let armed = self.bump();
        let shared = Arc::clone(&self.shared);
        let deadline = Instant::now() + delay;

        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                if wait_until(&shared, armed, deadline) {
                    task();
                }
            })
            .map_err(|e| ProfilerError::ThreadSpawn {
                thread: THREAD_NAME,
                reason: e.to_string(),
            })?;

        tracing::debug!(delay_ms = delay.as_millis() as u64, "Recording timeout armed");
        Ok(())
    }

    /// Retire the pending task, if any.
    pub fn cancel(&self) {
        self.bump();
    }

    fn bump(&self) -> u64 {
        let mut generation = self.shared.generation.lock();
        *generation += 1;
        self.shared.wake.notify_all();
        *generation
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Wait for `deadline`. Returns false if the timer was superseded.
fn wait_until(shared: &TimerShared, armed: u64, deadline: Instant) -> bool {
    let mut generation = shared.generation.lock();
    loop {
        if *generation != armed {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        shared.wake.wait_for(&mut generation, deadline - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_task_fires_after_delay() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        scheduler
            .arm(Duration::from_millis(20), move || {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rearm_retires_previous_task() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let f = Arc::clone(&fired);
            scheduler
                .arm(Duration::from_millis(50), move || {
                    f.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        thread::sleep(Duration::from_millis(400));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        scheduler
            .arm(Duration::from_millis(30), move || {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        scheduler.cancel();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
