//! Injectable time source for playout pacing

use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;

/// Monotonic millisecond clock
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<u64>,
}

impl ManualClock {
    /// Create a clock reading `start` milliseconds
    pub fn new(start: u64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: u64) {
        *self.now.lock() += ms;
    }

    /// Jump to an absolute reading
    pub fn set(&self, ms: u64) {
        *self.now.lock() = ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        *self.now.lock()
    }
}
