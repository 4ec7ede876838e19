//! Token bucket rate limiter.

use std::time::Duration;

use deckhand_core::config::RateLimitSettings;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Slack for float rounding in the refill arithmetic.
const EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket starting full at `burst`, refilled continuously at `rate`
/// tokens per second.
///
/// Refill is computed lazily from elapsed time on every call; waiting
/// callers sleep for the deficit instead of polling.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// `rate` must be positive; `burst` is at least one token.
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: rate.max(f64::MIN_POSITIVE),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Requests larger than the bucket would wait forever; clamp them.
    fn units(&self, units: u32) -> f64 {
        f64::from(units.max(1)).min(self.burst)
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
    }

    /// Wait until `units` tokens are available, then take them.
    pub async fn acquire(&self, units: u32) {
        let units = self.units(units);
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens + EPSILON >= units {
                    bucket.tokens = (bucket.tokens - units).max(0.0);
                    return;
                }
                Duration::try_from_secs_f64((units - bucket.tokens) / self.rate)
                    .unwrap_or(Duration::MAX)
            };
            debug!(wait_ms = wait.as_millis() as u64, units, "Rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Take `units` tokens if available right now.
    pub async fn try_acquire(&self, units: u32) -> bool {
        let units = self.units(units);
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens + EPSILON >= units {
            bucket.tokens = (bucket.tokens - units).max(0.0);
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }
}

impl From<&RateLimitSettings> for RateLimiter {
    fn from(settings: &RateLimitSettings) -> Self {
        Self::new(settings.rate, settings.burst)
    }
}
