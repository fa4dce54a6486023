//! Retry timing for upstream requests
//!
//! | Condition | Extra wait before the retry |
//! |-----------|-----------------------------|
//! | HTTP 429 | rate-limit cool-down |
//! | HTTP 5xx (incl. 520) | server-error cool-down |
//! | Anything else | none |
//!
//! Every retry also waits `min(base * 2^attempt, max)`.

use crate::config::RetryConfig;
use reqwest::StatusCode;
use std::time::Duration;

/// Why an attempt failed, as far as timing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    ServerError,
    Other,
}

impl FailureKind {
    /// Classifies a non-200 status
    pub fn classify(status: StatusCode) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited
        } else if status.is_server_error() {
            Self::ServerError
        } else {
            Self::Other
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit_cooldown: Duration,
    pub server_error_cooldown: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            rate_limit_cooldown: Duration::from_millis(config.rate_limit_cooldown_ms),
            server_error_cooldown: Duration::from_millis(config.server_error_cooldown_ms),
        }
    }
}

impl RetryPolicy {
    /// Total number of requests a query may issue
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Exponential part of the wait before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Fixed cool-down for the failure kind
    pub fn cooldown(&self, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::RateLimited => self.rate_limit_cooldown,
            FailureKind::ServerError => self.server_error_cooldown,
            FailureKind::Other => Duration::ZERO,
        }
    }

    /// Full wait before retry number `attempt`
    pub fn delay_before_retry(&self, attempt: u32, kind: FailureKind) -> Duration {
        self.cooldown(kind) + self.backoff(attempt)
    }
}
