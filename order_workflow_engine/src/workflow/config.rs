use chrono::Duration;

use crate::workflow::{
    conditions::UnknownFieldPolicy,
    retry::{RetryBackoff, RetryPolicy},
};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::seconds(5);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::minutes(5);
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::seconds(30);
pub const DEFAULT_AUTO_TRANSITION_DELAY: Duration = Duration::seconds(2);
pub const DEFAULT_WORKER_SHARDS: usize = 1;
pub const DEFAULT_ADMIN_CHANNEL: &str = "admin";

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// The number of retries a task gets after its first attempt fails.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff: RetryBackoff,
    /// Upper bound on the delay between retries when the backoff is exponential.
    pub max_retry_delay: Duration,
    /// A task attempt that runs longer than this is abandoned and takes the retry path.
    pub task_timeout: Duration,
    /// How long after a status change an auto-transition task becomes due.
    pub auto_transition_delay: Duration,
    /// The number of orders whose tasks may execute at the same time. Tasks for a single order always run one at a
    /// time.
    pub worker_shards: usize,
    /// What to do with conditions that name a field the evaluator does not know about.
    pub unknown_field_policy: UnknownFieldPolicy,
    /// Recipient id for notifications meant for administrators.
    pub admin_channel: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_backoff: RetryBackoff::default(),
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            auto_transition_delay: DEFAULT_AUTO_TRANSITION_DELAY,
            worker_shards: DEFAULT_WORKER_SHARDS,
            unknown_field_policy: UnknownFieldPolicy::default(),
            admin_channel: DEFAULT_ADMIN_CHANNEL.to_string(),
        }
    }
}

impl WorkflowConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            backoff: self.retry_backoff,
            max_retry_delay: self.max_retry_delay,
        }
    }

    /// The task timeout as a std duration, for use with tokio timers. Negative values are treated as zero.
    pub fn task_timeout_std(&self) -> std::time::Duration {
        self.task_timeout.to_std().unwrap_or(std::time::Duration::ZERO)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_auto_transition_delay(mut self, delay: Duration) -> Self {
        self.auto_transition_delay = delay;
        self
    }

    pub fn with_worker_shards(mut self, shards: usize) -> Self {
        self.worker_shards = shards.max(1);
        self
    }

    pub fn with_unknown_field_policy(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_field_policy = policy;
        self
    }

    pub fn with_admin_channel<S: Into<String>>(mut self, channel: S) -> Self {
        self.admin_channel = channel.into();
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::seconds(5));
        assert_eq!(config.task_timeout_std(), std::time::Duration::from_secs(30));
        assert_eq!(config.worker_shards, 1);
        assert_eq!(config.admin_channel, "admin");
        assert_eq!(config.retry_policy().backoff, RetryBackoff::Fixed);
    }

    #[test]
    fn shards_are_at_least_one() {
        let config = WorkflowConfig::default().with_worker_shards(0);
        assert_eq!(config.worker_shards, 1);
    }
}
