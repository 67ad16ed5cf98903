//! # token-bucket
//!
//! A token bucket rate limiter shared between any number of async tasks.
//!
//! Tokens refill continuously at a fixed rate up to the burst capacity. A
//! caller of [`RateLimiter::acquire`] reserves a token right away, which may
//! drive the balance negative, and then sleeps until the reservation matures.
//! Reservations mature in the order they were taken so a waiter is never
//! passed over indefinitely.
mod errors;

pub use crate::errors::{Error, Result};

use parking_lot::Mutex;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Gate bounding how often callers may proceed
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
    /// when the most recent reservation matures
    last_event: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + dt * rate).min(capacity);
    }
}

impl RateLimiter {
    /// create a limiter refilling `rate_per_sec` tokens per second with room
    /// for `burst` tokens. The bucket starts full.
    pub fn new(rate_per_sec: f64, burst: u32) -> Result<Self> {
        if !rate_per_sec.is_finite() || rate_per_sec <= 0.0 {
            return Err(Error::InvalidRate(rate_per_sec));
        }
        if burst == 0 {
            return Err(Error::InvalidBurst);
        }
        let capacity = f64::from(burst);
        let now = Instant::now();
        Ok(Self {
            rate: rate_per_sec,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last: now,
                last_event: now,
            }),
        })
    }

    /// tokens per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// max tokens held at once
    pub fn burst(&self) -> u32 {
        self.capacity as u32
    }

    /// Wait until a token is available and take it.
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled before the
    /// reservation matures; the reserved token is handed back in that case.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let now = Instant::now();
        let wait = self.reserve(now);
        if wait.is_zero() {
            return Ok(());
        }
        trace!(?wait, "waiting for token");
        tokio::select! {
            biased;
            _ = sleep(wait) => Ok(()),
            _ = token.cancelled() => {
                self.release(now + wait);
                Err(Error::Cancelled)
            }
        }
    }

    /// takes one token and returns how long until it may be used
    fn reserve(&self, now: Instant) -> Duration {
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.rate, self.capacity);
        bucket.tokens -= 1.0;
        let wait = if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        };
        bucket.last_event = now + wait;
        wait
    }

    /// Hand back a reservation maturing at `time_to_act`. Only the part of the
    /// token that later reservations haven't already been scheduled against is
    /// returned.
    fn release(&self, time_to_act: Instant) {
        let now = Instant::now();
        let mut bucket = self.bucket.lock();
        let claimed = bucket.last_event.saturating_duration_since(time_to_act);
        let restore = 1.0 - claimed.as_secs_f64() * self.rate;
        if restore <= 0.0 {
            trace!("reservation already claimed by later waiters");
            return;
        }
        bucket.refill(now, self.rate, self.capacity);
        bucket.tokens = (bucket.tokens + restore).min(self.capacity);
        if time_to_act == bucket.last_event {
            // latest reservation withdrawn, step the schedule back one slot
            let step = Duration::from_secs_f64(1.0 / self.rate);
            if let Some(prev) = time_to_act.checked_sub(step).filter(|prev| *prev >= now) {
                bucket.last_event = prev;
            }
        }
    }
}
