use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use log::*;
use order_workflow_engine::{
    workflow::{RetryBackoff, UnknownFieldPolicy},
    WorkflowConfig,
};
use owf_common::helpers::parse_boolean_flag;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/order_workflow.db";
const DEFAULT_POLL_INTERVAL: Duration = Duration::seconds(1);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 32;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    /// How often the dispatcher looks for due tasks.
    pub poll_interval: Duration,
    /// Capacity of each event channel. Publishers wait when a channel is full.
    pub event_buffer_size: usize,
    pub run_migrations: bool,
    pub workflow: WorkflowConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            run_migrations: true,
            workflow: WorkflowConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("OWF_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ OWF_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let run_migrations = parse_boolean_flag(env::var("OWF_RUN_MIGRATIONS").ok(), true);
        let poll_interval = read_millis("OWF_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL);
        let event_buffer_size = read_value("OWF_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        let workflow = workflow_config_from_env();
        Self { database_url, poll_interval, event_buffer_size, run_migrations, workflow }
    }
}

fn workflow_config_from_env() -> WorkflowConfig {
    let defaults = WorkflowConfig::default();
    let retry_backoff = env::var("OWF_RETRY_BACKOFF")
        .ok()
        .and_then(|s| {
            parse_backoff(&s)
                .map_err(|_| {
                    error!("🪛️ {s} is not a valid value for OWF_RETRY_BACKOFF. Use 'fixed' or 'exponential'.")
                })
                .ok()
        })
        .unwrap_or(defaults.retry_backoff);
    let fail_closed = parse_boolean_flag(env::var("OWF_FAIL_CLOSED_CONDITIONS").ok(), false);
    let unknown_field_policy = if fail_closed { UnknownFieldPolicy::Fail } else { UnknownFieldPolicy::Pass };
    let admin_channel = env::var("OWF_ADMIN_CHANNEL").ok().filter(|s| !s.trim().is_empty());
    let mut config = WorkflowConfig {
        max_retries: read_value("OWF_MAX_RETRIES", defaults.max_retries),
        retry_delay: read_millis("OWF_RETRY_DELAY_MS", defaults.retry_delay),
        retry_backoff,
        max_retry_delay: read_millis("OWF_MAX_RETRY_DELAY_MS", defaults.max_retry_delay),
        task_timeout: read_millis("OWF_TASK_TIMEOUT_MS", defaults.task_timeout),
        auto_transition_delay: read_millis("OWF_AUTO_TRANSITION_DELAY_MS", defaults.auto_transition_delay),
        worker_shards: read_value("OWF_WORKER_SHARDS", defaults.worker_shards).max(1),
        unknown_field_policy,
        ..defaults
    };
    if let Some(channel) = admin_channel {
        config = config.with_admin_channel(channel);
    }
    config
}

pub fn parse_backoff(s: &str) -> Result<RetryBackoff, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "fixed" => Ok(RetryBackoff::Fixed),
        "exponential" => Ok(RetryBackoff::Exponential),
        other => Err(format!("Unknown backoff: {other}")),
    }
}

/// Reads a millisecond count from the environment. Missing or invalid values give the default.
fn read_millis(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Ok(s) => parse_millis(&s).unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name}. {e} Using the default of {}ms.", default.num_milliseconds());
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {}ms.", default.num_milliseconds());
            default
        },
    }
}

pub fn parse_millis(s: &str) -> Result<Duration, String> {
    let ms = s.trim().parse::<i64>().map_err(|e| format!("'{s}' is not a number of milliseconds: {e}."))?;
    if ms < 0 {
        return Err(format!("'{s}' is negative."));
    }
    Ok(Duration::milliseconds(ms))
}

fn read_value<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn millis() {
        assert_eq!(parse_millis("1500").unwrap(), Duration::milliseconds(1500));
        assert_eq!(parse_millis(" 0 ").unwrap(), Duration::zero());
        assert!(parse_millis("-5").is_err());
        assert!(parse_millis("5s").is_err());
    }

    #[test]
    fn backoff() {
        assert_eq!(parse_backoff("Exponential").unwrap(), RetryBackoff::Exponential);
        assert_eq!(parse_backoff("fixed").unwrap(), RetryBackoff::Fixed);
        assert!(parse_backoff("linear").is_err());
    }

    #[test]
    fn values_fall_back_to_defaults() {
        env::set_var("OWF_TEST_CONFIG_SHARDS", "four");
        assert_eq!(read_value("OWF_TEST_CONFIG_SHARDS", 1usize), 1);
        env::set_var("OWF_TEST_CONFIG_SHARDS", "4");
        assert_eq!(read_value("OWF_TEST_CONFIG_SHARDS", 1usize), 4);
        assert_eq!(read_value("OWF_TEST_CONFIG_NOT_SET", 7u32), 7);
        env::set_var("OWF_TEST_CONFIG_DELAY", "soon");
        assert_eq!(read_millis("OWF_TEST_CONFIG_DELAY", Duration::seconds(2)), Duration::seconds(2));
        env::set_var("OWF_TEST_CONFIG_DELAY", "250");
        assert_eq!(read_millis("OWF_TEST_CONFIG_DELAY", Duration::seconds(2)), Duration::milliseconds(250));
    }

    #[test]
    fn default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::seconds(1));
        assert_eq!(config.event_buffer_size, 32);
        assert!(config.run_migrations);
        assert_eq!(config.workflow.max_retries, 3);
        assert_eq!(config.workflow.admin_channel, "admin");
    }
}
