//! Debounce timeout value type.

use std::time::{Duration, Instant};

/// A point in time after which an adaptive refresh may fire again.
///
/// Value object: created once per accepted trigger, compared, never
/// mutated. Uses the monotonic clock so wall-time adjustments cannot
/// reopen or stretch the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    expires_at: Instant,
}

impl Timeout {
    /// Creates a timeout expiring `duration` from now.
    pub fn new(duration: Duration) -> Self {
        Self {
            expires_at: Instant::now() + duration,
        }
    }

    /// Returns true once the window has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left in the window, clamped at zero.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}
