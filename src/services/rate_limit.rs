//! Per-client request limiting for the public booking endpoints.
//!
//! Counts live in process memory, so a restart or a second instance resets
//! them. Callers are keyed by the first `X-Forwarded-For` hop.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

/// Hard cap on tracked clients. New clients past it are refused.
const MAX_TRACKED_KEYS: usize = 10_000;

pub trait RateLimiter: Send + Sync {
    /// Records one request for `key`; `false` once the key is over its limit.
    fn allow(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

struct Tracked {
    windows: HashMap<String, Window>,
    last_sweep: Instant,
}

/// Fixed-window counter: at most `max_requests` per key per `window`.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    max_keys: usize,
    tracked: Mutex<Tracked>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_key_cap(max_requests, window, MAX_TRACKED_KEYS)
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    fn with_key_cap(max_requests: u32, window: Duration, max_keys: usize) -> Self {
        Self {
            max_requests,
            window,
            max_keys,
            tracked: Mutex::new(Tracked {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);

        if tracked.windows.len() >= self.max_keys && !tracked.windows.contains_key(key) {
            // Sweep at most once per window; nothing expires faster than that.
            if now.duration_since(tracked.last_sweep) >= self.window {
                let window = self.window;
                tracked
                    .windows
                    .retain(|_, w| now.duration_since(w.started) < window);
                tracked.last_sweep = now;
                tracing::debug!(tracked = tracked.windows.len(), "swept expired rate limit windows");
            }
            if tracked.windows.len() >= self.max_keys {
                tracing::warn!(client = key, max_keys = self.max_keys, "rate limiter key cap reached");
                return false;
            }
        }

        let entry = tracked.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            tracing::warn!(client = key, max = self.max_requests, "rate limit exceeded");
            return false;
        }
        entry.count += 1;
        true
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }
}

/// Identifies the caller: first `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_blocks_after_limit() {
        let limiter = FixedWindowLimiter::per_minute(3);
        let now = Instant::now();
        assert!(limiter.allow_at("a", now));
        assert!(limiter.allow_at("a", now));
        assert!(limiter.allow_at("a", now));
        assert!(!limiter.allow_at("a", now));
        // Other clients have their own budget.
        assert!(limiter.allow_at("b", now));
    }

    #[test]
    fn test_window_resets() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.allow_at("a", now));
        assert!(!limiter.allow_at("a", now + Duration::from_secs(59)));
        assert!(limiter.allow_at("a", now + Duration::from_secs(60)));
    }

    #[test]
    fn test_new_keys_refused_at_cap_until_windows_expire() {
        let window = Duration::from_secs(60);
        let limiter = FixedWindowLimiter::with_key_cap(5, window, 2);
        let now = Instant::now();
        assert!(limiter.allow_at("a", now));
        assert!(limiter.allow_at("b", now));
        assert!(!limiter.allow_at("c", now));
        // Known keys keep their budget.
        assert!(limiter.allow_at("a", now));

        let later = now + window;
        assert!(limiter.allow_at("c", later));
        let tracked = limiter.tracked.lock().unwrap();
        assert_eq!(tracked.windows.len(), 1);
        assert!(tracked.windows.contains_key("c"));
    }

    #[test]
    fn test_zero_limit_blocks_everything() {
        let limiter = FixedWindowLimiter::per_minute(0);
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn test_client_key_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_key(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_key_fallbacks() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_key(&headers), "198.51.100.4");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert_eq!(client_key(&headers), "198.51.100.4");
    }
}
