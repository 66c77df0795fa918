//! Fixed-window rate limiter
//!
//! Each identifier (client IP plus route scope) gets a counter that opens
//! with its first request. Requests inside the window increment it; once the
//! window has elapsed the next request opens a fresh one. Counters live in a
//! bounded moka cache whose idle expiry only bounds memory; window resets are
//! decided from the recorded start time.

use crate::config::RateLimitConfig;
use moka::future::Cache;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default number of identifiers tracked per limiter
pub const DEFAULT_MAX_KEYS: u64 = 100_000;

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Whole seconds until reset, rounded up, for `Retry-After`
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }
}

/// Fixed-window request counter keyed by identifier
pub struct RateLimiter {
    windows: Cache<String, Arc<Mutex<Window>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_capacity(max_requests, window, DEFAULT_MAX_KEYS)
    }

    pub fn with_capacity(max_requests: u32, window: Duration, max_keys: u64) -> Self {
        let windows = Cache::builder()
            .max_capacity(max_keys)
            .time_to_idle(window)
            .build();
        Self {
            windows,
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request for `key` and decide whether it may proceed
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let entry = self
            .windows
            .get_with(key.to_string(), async move {
                Arc::new(Mutex::new(Window {
                    started: now,
                    count: 0,
                }))
            })
            .await;

        let mut window = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.window {
            window.started = now;
            window.count = 0;
        }

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(window.started));

        if window.count >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - window.count,
            reset_after,
        }
    }

    /// Forget the counter for `key`
    pub async fn reset(&self, key: &str) {
        self.windows.invalidate(key).await;
    }

    /// Number of tracked identifiers (approximate until housekeeping runs)
    pub fn len(&self) -> u64 {
        self.windows.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply pending evictions and expirations
    pub async fn run_pending_tasks(&self) {
        self.windows.run_pending_tasks().await;
    }
}

/// Route groups with separate budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// Login and registration
    Auth,
    /// Public writes: comments, reactions, views, reading sessions
    Write,
    /// AI completions
    Ai,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Write => "write",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One limiter per scope, built from configuration
pub struct RateLimiters {
    enabled: bool,
    auth: RateLimiter,
    write: RateLimiter,
    ai: RateLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let window = Duration::from_secs(config.window_secs);
        let keys = config.max_tracked_keys;
        Self {
            enabled: config.enabled,
            auth: RateLimiter::with_capacity(config.auth_max_requests, window, keys),
            write: RateLimiter::with_capacity(config.write_max_requests, window, keys),
            ai: RateLimiter::with_capacity(config.ai_max_requests, window, keys),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, scope: RateLimitScope) -> &RateLimiter {
        match scope {
            RateLimitScope::Auth => &self.auth,
            RateLimitScope::Write => &self.write,
            RateLimitScope::Ai => &self.ai,
        }
    }

    /// Check `client` against the budget of `scope`
    pub async fn check(&self, scope: RateLimitScope, client: &str) -> RateLimitDecision {
        self.get(scope)
            .check(&format!("{}:{}", scope, client))
            .await
    }

    pub async fn run_pending_tasks(&self) {
        self.auth.run_pending_tasks().await;
        self.write.run_pending_tasks().await;
        self.ai.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denies_after_max_requests() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("ip").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.limit, 3);
        }

        let denied = limiter.check("ip").await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_after <= Duration::from_secs(60));
        assert!(denied.retry_after_secs() >= 1);

        // Other keys have their own window
        assert!(limiter.check("other").await.allowed);
    }

    #[tokio::test]
    async fn test_window_resets_after_it_elapses() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("ip", start).await.allowed);
        assert!(limiter.check_at("ip", start + Duration::from_secs(10)).await.allowed);
        assert!(!limiter.check_at("ip", start + Duration::from_secs(59)).await.allowed);

        let fresh = limiter.check_at("ip", start + Duration::from_secs(60)).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
        assert_eq!(fresh.reset_after, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_window_is_fixed_not_sliding() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_at("ip", start).await.allowed);
        // Denied requests do not extend the window
        assert!(!limiter.check_at("ip", start + Duration::from_secs(5)).await.allowed);
        assert!(!limiter.check_at("ip", start + Duration::from_secs(9)).await.allowed);
        assert!(limiter.check_at("ip", start + Duration::from_secs(10)).await.allowed);
    }

    #[tokio::test]
    async fn test_real_clock_reset() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("ip").await.allowed);
        assert!(!limiter.check("ip").await.allowed);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.check("ip").await.allowed);
    }

    #[tokio::test]
    async fn test_reset_and_len() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.check("a").await;
        limiter.check("b").await;
        limiter.run_pending_tasks().await;
        assert_eq!(limiter.len(), 2);

        assert!(!limiter.check("a").await.allowed);
        limiter.reset("a").await;
        assert!(limiter.check("a").await.allowed);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let config = RateLimitConfig {
            auth_max_requests: 1,
            write_max_requests: 2,
            ..Default::default()
        };
        let limiters = RateLimiters::from_config(&config);

        assert!(limiters.check(RateLimitScope::Auth, "1.2.3.4").await.allowed);
        assert!(!limiters.check(RateLimitScope::Auth, "1.2.3.4").await.allowed);
        assert!(limiters.check(RateLimitScope::Write, "1.2.3.4").await.allowed);
        assert_eq!(limiters.get(RateLimitScope::Write).max_requests(), 2);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_after: Duration::from_millis(1500),
        };
        assert_eq!(decision.retry_after_secs(), 2);
    }
}
