//! Retry policy configuration and delay calculation.

use rand::Rng;
use std::time::Duration;

use crate::error::GeminiError;

/// Retry policy with exponential backoff.
///
/// Defaults match the connection-layer contract: up to 2 retries (3 total
/// attempts), 200ms base delay doubling per attempt, capped at 2 seconds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling applied to the exponential backoff.
    pub max_delay: Duration,
    /// Whether to add jitter to delays.
    pub use_jitter: bool,
    /// Maximum jitter fraction (0.0 to 1.0).
    pub jitter_factor: f64,
    /// Custom retry condition; defaults to `GeminiError::is_retryable`.
    pub retry_condition: Option<fn(&GeminiError) -> bool>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(2000),
            use_jitter: false,
            jitter_factor: 0.1,
            retry_condition: None,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retries (total attempts = retries + 1).
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay.
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay ceiling.
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable jitter. Jitter never makes a delay exceed the configured
    /// ceiling by more than the jitter fraction and does not change the
    /// retry contract.
    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Set a custom retry condition.
    pub fn with_retry_condition(mut self, condition: fn(&GeminiError) -> bool) -> Self {
        self.retry_condition = Some(condition);
        self
    }

    /// Whether this error should be retried.
    pub fn should_retry(&self, error: &GeminiError) -> bool {
        match self.retry_condition {
            Some(condition) => condition(error),
            None => error.is_retryable(),
        }
    }

    /// Delay before the retry following `attempt` (0-based):
    /// `min(base * 2^attempt, max)`, plus optional jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if self.use_jitter {
            self.add_jitter(exp)
        } else {
            exp
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let range = delay.as_millis() as f64 * self.jitter_factor;
        if range <= 0.0 {
            return delay;
        }
        let jitter = rng.gen_range(-range..=range);
        Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1600));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(2000));
    }

    #[test]
    fn delays_are_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut last = Duration::ZERO;
        for attempt in 0..8 {
            let d = policy.delay_for_attempt(attempt);
            assert!(d >= last, "delay shrank at attempt {attempt}");
            last = d;
        }
    }

    #[test]
    fn custom_condition_overrides_kind() {
        let policy = RetryPolicy::new().with_retry_condition(|_| true);
        assert!(policy.should_retry(&GeminiError::Validation("no".into())));
    }
}
