//! Process-wide request pacing
//!
//! Every outbound fetch, from any worker, first awaits a slot from the shared
//! `RateLimiter`. Slots are reserved under a short lock and then slept on
//! outside of it, so a waiting worker never blocks the others from queueing
//! behind it.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum gap between successive granted slots
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter that spaces slots at least `delay` apart
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_grant: Mutex::new(None),
        }
    }

    /// Convenience constructor from milliseconds, matching the config units
    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits for the next slot and returns the instant it was granted at
    ///
    /// The slot is computed against the most recent reservation, not the
    /// most recent completed wait, so concurrent callers are serialized even
    /// while they are all still sleeping.
    pub async fn await_slot(&self) -> Instant {
        let slot = self.reserve();
        tokio::time::sleep_until(slot).await;
        slot
    }

    fn reserve(&self) -> Instant {
        let now = Instant::now();
        // A poisoned marker is still a valid instant; keep pacing
        let mut last = match self.last_grant.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = match *last {
            Some(previous) => (previous + self.delay).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }
}
