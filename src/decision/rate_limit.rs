//! Token-bucket admission control for outbound decision-service calls
//!
//! `acquire` suspends the caller until a token is available; it never
//! drops a request and has no error path. The bucket holds at most
//! `burst` tokens and refills at `rate` tokens per second, so any
//! one-second window admits at most `rate + burst` calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    /// Tokens refilled per second
    rate: f64,
    /// Bucket capacity
    burst: f64,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `rate` tokens per second sustained, up to `burst` available at once.
    /// The bucket starts full.
    pub fn new(rate: f64, burst: f64) -> Self {
        assert!(rate > 0.0, "rate must be positive");
        assert!(burst >= 1.0, "burst must hold at least one token");
        Self {
            rate,
            burst,
            state: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available, then consume it.
    ///
    /// Safe under many concurrent callers; the lock is never held across
    /// a sleep.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
