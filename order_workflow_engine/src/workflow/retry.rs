use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How the delay before a retry grows with the number of attempts already made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Every retry waits `retry_delay`.
    #[default]
    Fixed,
    /// Retry `n` (counting from zero) waits `retry_delay * 2^n`, up to `max_retry_delay`.
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: RetryBackoff,
    pub max_retry_delay: Duration,
}

impl RetryPolicy {
    /// The delay before the retry that follows an attempt with the given `retry_count`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        match self.backoff {
            RetryBackoff::Fixed => self.retry_delay,
            RetryBackoff::Exponential => {
                let factor = 2i64.checked_pow(retry_count).unwrap_or(i64::MAX);
                let millis = self.retry_delay.num_milliseconds().saturating_mul(factor);
                Duration::milliseconds(millis.min(self.max_retry_delay.num_milliseconds()))
            },
        }
    }
}
