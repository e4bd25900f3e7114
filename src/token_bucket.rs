//! Lock-free token bucket.
//!
//! The bucket is stored as a single theoretical arrival time (GCRA): the instant at which the
//! bucket would be full again if nothing else were admitted. Admitting a request pushes that
//! instant forward by one emission interval; a request is rejected when doing so would move it
//! further than the burst tolerance ahead of `now`.

use crate::clock::Clock;
use crate::rate::Rate;
use std::sync::Arc;

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

/// Token bucket that never waits for capacity.
///
/// Each permit is handed to at most one caller, even when many threads race on the same
/// bucket.
pub struct TokenBucket {
    tat: AtomicU64,
    interval: u64,
    tolerance: u64,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Create a full bucket for `rate`, reading time from `clock`.
    pub fn new(rate: Rate, clock: Arc<dyn Clock>) -> Self {
        Self {
            tat: AtomicU64::new(0),
            interval: rate.interval_nanos(),
            tolerance: rate.tolerance_nanos(),
            clock,
        }
    }

    /// Take one permit if one is available right now.
    ///
    /// Returns `false` immediately when the bucket is empty, or when the next arrival time
    /// would no longer fit the clock's range.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now_nanos();
        let mut current = self.tat.load(Ordering::Acquire);
        loop {
            let Some(next) = current.max(now).checked_add(self.interval) else {
                return false;
            };
            if next - now > self.tolerance {
                return false;
            }
            match self.tat.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Permits that could be taken right now without being rejected.
    pub fn available(&self) -> u64 {
        let now = self.clock.now_nanos();
        let backlog = self.tat.load(Ordering::Acquire).saturating_sub(now);
        self.tolerance.saturating_sub(backlog) / self.interval
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("interval_nanos", &self.interval)
            .field("tolerance_nanos", &self.tolerance)
            .field("available", &self.available())
            .finish()
    }
}
