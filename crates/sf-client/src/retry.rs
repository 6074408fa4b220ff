//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, ErrorKind, Result};

/// Lower and upper bounds of the jitter multiplier.
const JITTER_RANGE: (f64, f64) = (0.8, 1.2);

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per logical call, the first one included. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff strategy to use.
    pub backoff: BackoffStrategy,
    /// Whether to respect Retry-After headers.
    pub respect_retry_after: bool,
    /// Maximum time to wait from Retry-After header.
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::ExponentialWithJitter { factor: 2.0 },
            respect_retry_after: true,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Set the total number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// More attempts and a longer Retry-After ceiling, for calls that must land.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff: BackoffStrategy::ExponentialWithJitter { factor: 2.0 },
            respect_retry_after: true,
            max_retry_after: Duration::from_secs(120),
        }
    }

    /// Reject configurations the executor cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::new(ErrorKind::Config(
                "retry max_attempts must be at least 1".to_string(),
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::new(ErrorKind::Config(
                "retry initial_delay exceeds max_delay".to_string(),
            )));
        }
        Ok(())
    }
}

/// Backoff strategy for determining retry delays.
#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    /// Constant delay between retries.
    Constant,
    /// Linear increase in delay (delay * retry).
    Linear,
    /// Exponential increase in delay (delay * factor^(retry - 1)).
    Exponential { factor: f64 },
    /// Exponential, scaled by a random multiplier in `[0.8, 1.2]`.
    ExponentialWithJitter { factor: f64 },
}

impl BackoffStrategy {
    /// Delay before retry number `retry` (1-based), capped at `max_delay`.
    pub fn delay(&self, retry: u32, initial_delay: Duration, max_delay: Duration) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let initial = initial_delay.as_secs_f64();
        let secs = match self {
            BackoffStrategy::Constant => initial,
            BackoffStrategy::Linear => initial * f64::from(retry.max(1)),
            BackoffStrategy::Exponential { factor } => initial * factor.powi(exponent),
            BackoffStrategy::ExponentialWithJitter { factor } => {
                let jitter = rand::rng().random_range(JITTER_RANGE.0..=JITTER_RANGE.1);
                initial * factor.powi(exponent) * jitter
            }
        };

        // powi overflows to infinity long before u32 retries; the cap absorbs it
        match Duration::try_from_secs_f64(secs) {
            Ok(delay) => delay.min(max_delay),
            Err(_) => max_delay,
        }
    }
}

/// Per-call retry bookkeeping.
///
/// One policy is created for each logical call; it counts failed attempts and
/// hands out the delay before the next one until the budget is spent.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    failures: u32,
}

impl RetryPolicy {
    /// Create a new retry policy from config.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Attempts that have failed so far.
    pub fn attempts(&self) -> u32 {
        self.failures
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Returns true if another attempt fits the budget.
    pub fn should_retry(&self) -> bool {
        self.failures < self.max_attempts()
    }

    /// Record a failed attempt and return the delay before the next one.
    /// Returns None once the attempt budget is spent.
    pub fn next_delay(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        self.failures += 1;
        if !self.should_retry() {
            return None;
        }

        let delay = match retry_after {
            Some(hint) if self.config.respect_retry_after => hint.min(self.config.max_retry_after),
            _ => self.config.backoff.delay(
                self.failures,
                self.config.initial_delay,
                self.config.max_delay,
            ),
        };
        Some(delay)
    }

    /// Reset the retry policy for a new request.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
