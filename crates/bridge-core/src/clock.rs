//! Time source for the control loop
//!
//! The loop never reads the system clock directly; everything time-based
//! (negotiation timeout, statistics period, display gating, inter-chunk
//! delay) goes through a [`Clock`] so simulations can run faster than real
//! time.

use std::time::{Duration, Instant};

/// Monotonic time plus a blocking sleep
pub trait Clock: Send {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
