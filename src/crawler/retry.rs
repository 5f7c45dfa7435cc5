//! Retry policy with exponential backoff
//!
//! The transport owns exactly one [`RetryPolicy`]. It is only consulted for
//! transient failures (connection errors, timeouts, 5xx, 408 and 429), which
//! are retried until the attempt ceiling is reached.
//!
//! # Delay Calculation
//!
//! ```text
//! delay = min(base * multiplier^(attempt - 1), max_delay) + jitter
//! ```

use crate::config::TransportConfig;
use rand::Rng;
use std::time::Duration;

/// Decision on whether to retry a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`; `attempt` is the 1-indexed number of the next attempt
    Retry { delay: Duration, attempt: u32 },

    /// Stop retrying
    GiveUp,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial one
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            multiplier: multiplier.max(1.0),
            jitter,
        }
    }

    /// Builds the policy from the transport section of the configuration
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.backoff_multiplier,
            config.jitter(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what to do after transient failure of `attempt` (1-indexed)
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = self.backoff(attempt) + self.random_jitter();
        tracing::debug!(
            "Attempt {} failed, retrying in {}ms",
            attempt,
            delay.as_millis()
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff before jitter for the retry following `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    fn random_jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
