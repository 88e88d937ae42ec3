//! Shared simulated clock.
//!
//! Only the kernel loop advances the clock. Node and consensus tasks read it
//! to stamp their work, so they observe whatever time the kernel last reached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Simulated time in seconds, shared between the kernel and its tasks.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    bits: Arc<AtomicU64>,
}

impl SimClock {
    /// Creates a clock at t = 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time in seconds.
    pub fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Moves the clock to `time`.
    ///
    /// The kernel only ever passes non-decreasing times.
    pub fn advance_to(&self, time: f64) {
        debug_assert!(time >= self.now(), "clock moved backwards");
        self.bits.store(time.to_bits(), Ordering::Release);
    }
}
