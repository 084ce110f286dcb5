//! Global request rate limiting
//!
//! A token bucket refilled at the configured requests-per-second. The bucket
//! holds at most one second's worth of tokens (and never less than one), so
//! bursts stay short.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every worker of a run
#[derive(Debug)]
pub struct GlobalRateLimiter {
    bucket: Mutex<Bucket>,
    capacity: f64,
    refill_rate: f64,
}

impl GlobalRateLimiter {
    /// Creates a limiter allowing `requests_per_second` on average
    pub fn new(requests_per_second: f64) -> Self {
        let capacity = requests_per_second.max(1.0);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate: requests_per_second,
        }
    }

    /// Takes a token if one is available
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A token was taken
    /// * `Err(Duration)` - Time until the next token
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let seconds = (1.0 - bucket.tokens) / self.refill_rate;
        Err(Duration::from_secs_f64(seconds.max(0.001)))
    }

    /// Waits until a token is available and takes it
    pub async fn acquire(&self) {
        // The lock is released before sleeping
        while let Err(wait) = self.try_acquire() {
            tracing::trace!("Global rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}
