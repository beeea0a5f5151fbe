//! Time sources for the control loops.
//!
//! The PID controller never reads the system clock directly. It asks a
//! [`Clock`], which lets tests move time forward (or backward) on demand.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock: Send + 'static {
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock. Clones share the same offset.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Moves time backwards, saturating at the clock's origin.
    pub fn rewind(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset = offset.saturating_sub(by);
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_shares_offset_between_clones() {
        let clock = ManualClock::new();
        let view = clock.clone();
        let start = view.now();

        clock.advance(Duration::from_millis(250));
        assert_eq!(view.now() - start, Duration::from_millis(250));

        clock.rewind(Duration::from_secs(5));
        assert_eq!(view.now(), start);
        assert_eq!(view.elapsed(), Duration::ZERO);
    }
}
