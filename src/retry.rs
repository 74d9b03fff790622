//! Exponential backoff for connection retries

use std::time::Duration;

use crate::config::ClientConfig;

/// Growth factor between consecutive retries
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound of random jitter, as a fraction of the computed delay
pub const JITTER_FACTOR: f64 = 0.1;

/// Stateless retry policy derived from the client configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier: BACKOFF_MULTIPLIER,
            jitter_factor: JITTER_FACTOR,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay(), config.max_retry_delay())
    }

    /// Capped exponential delay for retry `attempt` (0 is the first retry), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay for retry `attempt` with uniformly random jitter applied
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, rand::random::<f64>())
    }

    /// Delay for retry `attempt` using `sample` in `[0, 1)` as the jitter draw
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = base.mul_f64(self.jitter_factor * sample.clamp(0.0, 1.0));
        base + jitter
    }

    /// Largest delay this policy can ever produce
    pub fn ceiling(&self) -> Duration {
        self.max_delay.mul_f64(1.0 + self.jitter_factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}
