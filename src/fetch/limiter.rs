// src/fetch/limiter.rs
//! Coarse token bucket shared by every outbound request.
//!
//! Tokens refill by `rps` per whole elapsed second since the last refill,
//! capped at `burst`. An empty bucket is polled every 100ms; callers wait,
//! they never fail.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_RPS: u32 = 2;
pub const DEFAULT_BURST: u32 = 4;
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    rps: u32,
    burst: u32,
    bucket: Mutex<Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RPS, DEFAULT_BURST)
    }
}

impl RateLimiter {
    /// Starts with a full bucket. Zero values are bumped to 1.
    pub fn new(rps: u32, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            rps: rps.max(1),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rps(&self) -> u32 {
        self.rps
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        let mut waited = false;
        loop {
            {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket, Instant::now());
                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    if waited {
                        tracing::trace!(target: "fetch", remaining = bucket.tokens, "rate limiter released waiter");
                    }
                    return;
                }
            }
            waited = true;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Tokens currently available (after applying any due refill).
    pub async fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let whole_secs = now.saturating_duration_since(bucket.last_refill).as_secs();
        if whole_secs == 0 {
            return;
        }
        let add = whole_secs.saturating_mul(u64::from(self.rps));
        let tokens = (u64::from(bucket.tokens) + add).min(u64::from(self.burst));
        bucket.tokens = tokens as u32;
        bucket.last_refill = now;
    }
}
