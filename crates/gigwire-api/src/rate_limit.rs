//! Per-IP rate limiting
//!
//! Sliding-window buckets in memory: each key holds the timestamps of
//! its requests inside the window; a request over the limit is rejected
//! with the time until the oldest entry leaves the window. Buckets are
//! swept periodically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use gigwire_types::{GigwireError, Result};

/// Default window: 100 requests per 60 seconds per client
pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct RateBucket {
    requests: Vec<Instant>,
}

/// Sliding-window limiter keyed by client IP
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<RwLock<HashMap<String, RateBucket>>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            limit,
            window,
        }
    }

    /// Record a request for `key`, rejecting when over the limit
    pub async fn check(&self, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| RateBucket {
                requests: Vec::new(),
            });

        let window = self.window;
        bucket.requests.retain(|&t| now.duration_since(t) < window);

        if bucket.requests.len() >= self.limit as usize {
            let retry_after = bucket
                .requests
                .first()
                .map(|&oldest| window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(window);
            return Err(GigwireError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        bucket.requests.push(now);
        Ok(())
    }

    /// Drop buckets with no activity inside two windows
    pub async fn cleanup(&self) {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        let horizon = self.window * 2;
        buckets.retain(|_, bucket| {
            bucket
                .requests
                .last()
                .map(|&t| now.duration_since(t) < horizon)
                .unwrap_or(false)
        });
    }

    /// Spawn the periodic sweep
    pub fn spawn_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                limiter.cleanup().await;
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));

        for _ in 0..5 {
            assert!(limiter.check("1.2.3.4").await.is_ok());
        }
        let err = limiter.check("1.2.3.4").await.unwrap_err();
        assert_eq!(err.kind(), "rate_limited");

        // Other clients are unaffected
        assert!(limiter.check("5.6.7.8").await.is_ok());
    }

    #[tokio::test]
    async fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_millis(40));

        assert!(limiter.check("ip").await.is_ok());
        assert!(limiter.check("ip").await.is_ok());
        assert!(limiter.check("ip").await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.check("ip").await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_drops_idle_buckets() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10));
        limiter.check("ip").await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup().await;
        assert!(limiter.buckets.read().await.is_empty());
    }
}
