//! # Registration Rate Limiting
//!
//! Fixed-window limiter keyed by source address. In-memory only, so each
//! instance counts on its own.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared limiter. Clones share buckets.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

/// The caller's address as seen by this service, inserted into request
/// extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAddress(pub String);

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request from `key`. `Err` carries seconds until the window
    /// resets.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let window = Duration::from_secs(self.config.window_secs);
        let mut buckets = self.buckets.lock();

        // Drop expired buckets so one-off addresses do not accumulate.
        if buckets.len() > 10_000 {
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });
        if now.duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            let elapsed = now.duration_since(bucket.window_start);
            Err(window.saturating_sub(elapsed).as_secs().max(1))
        } else {
            bucket.count += 1;
            Ok(())
        }
    }
}

/// Socket peer address when the server was started with connect info,
/// otherwise `"unknown"`.
pub fn source_address(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Enforce the limiter found in extensions, keyed by source address, and
/// record the address as a [`SourceAddress`] extension.
pub async fn rate_limit_middleware(mut request: Request, next: Next) -> Response {
    let source = source_address(&request);
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        if let Err(retry_after_secs) = limiter.check(&source) {
            tracing::warn!(source = %source, "registration rate limit exceeded");
            return AppError::RateLimited { retry_after_secs }.into_response();
        }
    }

    request.extensions_mut().insert(SourceAddress(source));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs: 60,
        })
    }

    #[test]
    fn allows_up_to_limit_then_refuses() {
        let limiter = limiter(2);
        let now = Instant::now();
        assert!(limiter.check_at("203.0.113.7", now).is_ok());
        assert!(limiter.check_at("203.0.113.7", now).is_ok());
        let retry = limiter.check_at("203.0.113.7", now).unwrap_err();
        assert_eq!(retry, 60);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("b", now).is_ok());
        assert!(limiter.check_at("a", now).is_err());
    }

    #[test]
    fn window_resets() {
        let limiter = limiter(1);
        let start = Instant::now();
        assert!(limiter.check_at("a", start).is_ok());
        assert!(limiter.check_at("a", start + Duration::from_secs(30)).is_err());
        assert!(limiter.check_at("a", start + Duration::from_secs(61)).is_ok());
    }
}
