//! Retry budget and exponential backoff for Voyager calls

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempt budget and backoff shape for transient failures.
///
/// With the defaults a failing call is tried 3 times, waiting 1s then 2s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
    /// Spread each delay by +/- 50% to avoid retry storms.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// The delay doubles per attempt: `base * 2^(attempt - 1)`, capped at
    /// `max_delay_ms` before jitter is applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        let capped = scaled.min(self.max_delay_ms);

        if !self.jitter || capped == 0 {
            return Duration::from_millis(capped);
        }

        let spread = capped / 2;
        let offset = rand::thread_rng().gen_range(0..=spread * 2);
        Duration::from_millis(capped - spread + offset)
    }
}
