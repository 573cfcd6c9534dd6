use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

/// Minimum-interval gate in front of outbound completion requests.
///
/// One instance is shared by everything that should be throttled together;
/// the check-and-record in [`RateLimiter::try_acquire`] happens under a lock.
pub struct RateLimiter {
    min_delay: Duration,
    last_accepted: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self::with_clock(min_delay, Arc::new(SystemClock))
    }

    pub fn with_clock(min_delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_delay,
            last_accepted: Mutex::new(None),
            clock,
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Accepts when nothing was accepted yet or at least `min_delay` has
    /// passed since the last accepted call; acceptance records the time.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let Ok(mut last) = self.last_accepted.lock() else {
            return false;
        };
        if let Some(previous) = *last {
            if now.saturating_duration_since(previous) < self.min_delay {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted.lock().ok().and_then(|last| *last)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_delay", &self.min_delay)
            .field("last_accepted", &self.last_accepted())
            .finish()
    }
}
