//! Per-endpoint rate limiting for Voyager calls
//!
//! Keeps one fixed window per logical endpoint. Windows are created lazily on
//! the first call to an endpoint and live as long as the limiter.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// What to do when an endpoint's window is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPolicy {
    /// Wait until the window resets, then send.
    Queue,
    /// Fail the call with a `rate-limited` error.
    Reject,
}

/// Requests allowed per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitRule {
    pub fn window(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.window_ms).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub policy: RateLimitPolicy,
    /// Rule for endpoints without an explicit entry
    pub default: RateLimitRule,
    /// Overrides keyed by endpoint name (e.g. "share-create")
    pub endpoints: HashMap<String, RateLimitRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "share-create".to_string(),
            RateLimitRule {
                max_requests: 25,
                window_ms: 3_600_000,
            },
        );

        Self {
            policy: RateLimitPolicy::Reject,
            default: RateLimitRule {
                max_requests: 30,
                window_ms: 60_000,
            },
            endpoints,
        }
    }
}

/// Throttle tracking for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    pub endpoint: String,
    pub request_count: u32,
    pub window_start: DateTime<Utc>,
    pub is_limited: bool,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitState {
    fn open(endpoint: &str, now: DateTime<Utc>, rule: RateLimitRule) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            request_count: 0,
            window_start: now,
            is_limited: false,
            reset_at: now + rule.window(),
        }
    }
}

/// Result of asking the limiter for permission to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited { reset_at: DateTime<Utc> },
}

/// Rate limiter for Voyager endpoints
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateLimitState>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given limits
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.config.policy
    }

    pub fn rule_for(&self, endpoint: &str) -> RateLimitRule {
        self.config
            .endpoints
            .get(endpoint)
            .copied()
            .unwrap_or(self.config.default)
    }

    /// Check if sending is allowed and record the attempt
    ///
    /// Check and increment happen under one lock, so concurrent callers can
    /// never push the count past the rule's maximum.
    pub fn check_and_record(&self, endpoint: &str, now: DateTime<Utc>) -> Admission {
        let rule = self.rule_for(endpoint);
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let state = windows
            .entry(endpoint.to_string())
            .or_insert_with(|| RateLimitState::open(endpoint, now, rule));

        roll_window(state, now, rule);

        if state.request_count >= rule.max_requests {
            state.is_limited = true;
            return Admission::Limited {
                reset_at: state.reset_at,
            };
        }

        state.request_count += 1;
        state.is_limited = state.request_count >= rule.max_requests;
        Admission::Allowed
    }

    /// Snapshot of an endpoint's window, if it has seen traffic
    pub fn state(&self, endpoint: &str) -> Option<RateLimitState> {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.get(endpoint).cloned()
    }
}

/// Start a fresh window once the current one has elapsed. Never moves a
/// window backwards when `now` is older than its start.
fn roll_window(state: &mut RateLimitState, now: DateTime<Utc>, rule: RateLimitRule) {
    if now >= state.window_start + rule.window() {
        state.window_start = now;
        state.request_count = 0;
        state.is_limited = false;
        state.reset_at = now + rule.window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_limiter(max_requests: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            policy: RateLimitPolicy::Reject,
            default: RateLimitRule {
                max_requests,
                window_ms,
            },
            endpoints: HashMap::new(),
        })
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_allows_first_request() {
        let limiter = test_limiter(5, 60_000);
        assert_eq!(limiter.check_and_record("identity", at(0)), Admission::Allowed);
    }

    #[test]
    fn test_blocks_requests_over_limit() {
        let limiter = test_limiter(5, 60_000);

        for i in 0..5 {
            assert_eq!(
                limiter.check_and_record("identity", at(i)),
                Admission::Allowed,
                "Request {} should be allowed (under limit)",
                i + 1
            );
        }

        match limiter.check_and_record("identity", at(10)) {
            Admission::Limited { reset_at } => assert_eq!(reset_at, at(60)),
            Admission::Allowed => panic!("Request 6 should be blocked"),
        }

        let state = limiter.state("identity").unwrap();
        assert!(state.is_limited);
        assert_eq!(state.request_count, 5);
    }

    #[test]
    fn test_window_resets_after_elapsed() {
        let limiter = test_limiter(2, 60_000);
        limiter.check_and_record("identity", at(0));
        limiter.check_and_record("identity", at(1));
        assert!(matches!(
            limiter.check_and_record("identity", at(59)),
            Admission::Limited { .. }
        ));

        assert_eq!(limiter.check_and_record("identity", at(60)), Admission::Allowed);
        let state = limiter.state("identity").unwrap();
        assert_eq!(state.request_count, 1);
        assert_eq!(state.window_start, at(60));
        assert!(!state.is_limited);
    }

    #[test]
    fn test_window_never_moves_backwards() {
        let limiter = test_limiter(5, 60_000);
        limiter.check_and_record("identity", at(30));
        limiter.check_and_record("identity", at(10));

        let state = limiter.state("identity").unwrap();
        assert_eq!(state.window_start, at(30));
        assert_eq!(state.request_count, 2);
    }

    #[test]
    fn test_independent_endpoints() {
        let limiter = test_limiter(1, 60_000);
        limiter.check_and_record("identity", at(0));

        assert_eq!(
            limiter.check_and_record("analytics-card", at(0)),
            Admission::Allowed,
            "analytics-card should be independent of identity"
        );
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = RateLimitConfig::default();
        config.endpoints.insert(
            "identity".to_string(),
            RateLimitRule {
                max_requests: 1,
                window_ms: 1_000,
            },
        );
        let limiter = RateLimiter::new(config);

        assert_eq!(limiter.rule_for("identity").max_requests, 1);
        assert_eq!(limiter.rule_for("feed-updates").max_requests, 30);
    }

    #[test]
    fn test_concurrent_increments_never_exceed_max() {
        use std::sync::Arc;

        let limiter = Arc::new(test_limiter(50, 60_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_and_record("identity", at(0)) == Admission::Allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
        assert_eq!(limiter.state("identity").unwrap().request_count, 50);
    }
}
