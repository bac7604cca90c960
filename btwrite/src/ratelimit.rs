//! A pacing rate limiter shared by all workers of a run.

use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Paces operations to an aggregate rate across all callers.
///
/// Every call to [`acquire`](Self::acquire) reserves the next free slot, slots being spaced
/// `1 / rps` apart, and sleeps until that slot. The limit therefore holds for the sum of all
/// callers: adding workers does not increase throughput.
///
/// After idle periods, up to `burst` slots in the past may be handed out immediately. With the
/// default burst of `0`, at most `rps * T + 1` operations are admitted in any interval `T`.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    slack: Duration,
    next: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `rps` operations per second without bursting.
    pub fn new(rps: NonZeroU32) -> Self {
        Self::with_burst(rps, 0)
    }

    /// Creates a limiter admitting `rps` operations per second with the given burst allowance.
    pub fn with_burst(rps: NonZeroU32, burst: u32) -> Self {
        // Rounded up, so the admitted rate never exceeds `rps` and the interval is never zero.
        let interval = Duration::from_nanos(NANOS_PER_SEC.div_ceil(u64::from(rps.get())));
        Self {
            interval,
            slack: interval * burst,
            next: Mutex::new(None),
        }
    }

    /// The spacing between two admitted operations.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the caller may perform one operation.
    pub async fn acquire(&self) {
        let slot = self.reserve();
        tokio::time::sleep_until(slot).await;
    }

    /// Reserves the next slot and returns the instant at which it opens.
    fn reserve(&self) -> Instant {
        let now = Instant::now();
        // The guarded value is a plain instant, so a poisoned lock still holds a valid slot.
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);

        let earliest = now.checked_sub(self.slack).unwrap_or(now);
        let slot = match *next {
            Some(next) => next.max(earliest),
            None => now,
        };

        *next = Some(slot + self.interval);
        slot
    }
}
