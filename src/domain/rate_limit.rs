//! Pacing of calls to the external market-data provider.
//!
//! Batch services call [`RateLimiter::acquire`] before every provider request.
//! The production limiter blocks the calling thread until the provider's
//! minimum inter-call interval has elapsed.

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use std::time::Duration;

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub trait RateLimiter: Send + Sync {
    /// Block until the next call may go out.
    fn acquire(&self);
}

/// At most one call per `interval`, with no burst allowance.
pub struct MinIntervalLimiter {
    limiter: Option<DirectRateLimiter>,
    interval: Duration,
}

impl MinIntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(DirectRateLimiter::direct);
        Self { limiter, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl RateLimiter for MinIntervalLimiter {
    fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        let clock = DefaultClock::default();
        while let Err(not_until) = limiter.check() {
            let wait = not_until
                .wait_time_from(clock.now())
                .min(self.interval)
                .max(Duration::from_millis(1));
            tracing::debug!(wait_ms = wait.as_millis() as u64, "pacing provider call");
            std::thread::sleep(wait);
        }
    }
}
