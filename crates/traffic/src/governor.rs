//! Aggregate rate limiting for traffic generation.
//!
//! Uses a token bucket shared by every simulated client of a run, so the
//! configured rate caps the total issuance rate regardless of client count.
//! Adding clients redistributes throughput instead of multiplying it.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Invalid governor configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GovernorError {
    #[error("Rate must be positive and finite, got {0}")]
    InvalidRate(f64),

    #[error("Burst must be at least 1")]
    ZeroBurst,
}

/// Token bucket state.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens available. Negative while reservations are
    /// outstanding.
    tokens: f64,
    /// Maximum tokens (bucket capacity).
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    /// Last time we updated the bucket.
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            tokens: f64::from(capacity),
            capacity: f64::from(capacity),
            refill_rate,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    /// Take one token, possibly on credit, returning how long until it is
    /// actually available.
    fn reserve(&mut self) -> Duration {
        self.refill();
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_rate)
        }
    }

    /// Give back a token taken by [`reserve`](Self::reserve).
    fn release(&mut self) {
        self.tokens = (self.tokens + 1.0).min(self.capacity);
    }
}

/// Shared throughput governor.
#[derive(Debug)]
pub struct Governor {
    bucket: Mutex<TokenBucket>,
}

impl Governor {
    /// Create a governor allowing `requests_per_sec` sustained with bursts of
    /// up to `burst` requests.
    pub fn new(requests_per_sec: f64, burst: u32) -> Result<Self, GovernorError> {
        if !requests_per_sec.is_finite() || requests_per_sec <= 0.0 {
            return Err(GovernorError::InvalidRate(requests_per_sec));
        }
        if burst == 0 {
            return Err(GovernorError::ZeroBurst);
        }
        Ok(Self {
            bucket: Mutex::new(TokenBucket::new(burst, requests_per_sec)),
        })
    }

    /// Wait until a token is available or `cancel` fires.
    ///
    /// Returns false if the wait was cancelled; the reserved token is then
    /// returned to the bucket.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let delay = self.bucket.lock().reserve();
        if delay.is_zero() {
            return true;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.bucket.lock().release();
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_config() {
        assert_eq!(
            Governor::new(0.0, 10).unwrap_err(),
            GovernorError::InvalidRate(0.0)
        );
        assert!(Governor::new(f64::NAN, 10).is_err());
        assert_eq!(Governor::new(10.0, 0).unwrap_err(), GovernorError::ZeroBurst);
    }

    #[tokio::test]
    async fn test_burst_then_limited() {
        let governor = Governor::new(1.0, 5).unwrap();
        let cancel = CancellationToken::new();
        let quick = Duration::from_millis(50);

        // Should allow burst of 5 requests
        for _ in 0..5 {
            let waited = tokio::time::timeout(quick, governor.wait(&cancel)).await;
            assert_eq!(waited, Ok(true), "Should allow burst");
        }

        // 6th request should be rate limited
        let waited = tokio::time::timeout(quick, governor.wait(&cancel)).await;
        assert!(waited.is_err(), "Should rate limit after burst");
    }

    #[tokio::test]
    async fn test_token_refill() {
        let governor = Governor::new(20.0, 1).unwrap();
        let cancel = CancellationToken::new();
        assert!(governor.wait(&cancel).await);

        // Wait for refill (20/sec = 50ms per token)
        tokio::time::sleep(Duration::from_millis(60)).await;

        let waited = tokio::time::timeout(Duration::from_millis(20), governor.wait(&cancel)).await;
        assert_eq!(waited, Ok(true));
    }

    #[tokio::test]
    async fn test_wait_paces_requests() {
        let governor = Governor::new(100.0, 1).unwrap();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        // First token is immediate, the next ten are paced at 10ms each.
        for _ in 0..11 {
            assert!(governor.wait(&cancel).await);
        }

        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let governor = Governor::new(0.5, 1).unwrap();
        let cancel = CancellationToken::new();
        assert!(governor.wait(&cancel).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!governor.wait(&cancel).await);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!governor.wait(&cancel).await);
    }
}
