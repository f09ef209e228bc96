//! Queue configuration.

use std::time::Duration;

/// Default queue name.
pub const DEFAULT_QUEUE_NAME: &str = "mem_bank_jobs";
/// Default retry bound.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base retry delay.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Default per-job execution timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default retention of job snapshots and results.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default number of workers.
pub const DEFAULT_CONCURRENCY: usize = 5;
/// Default worker poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default cleanup interval.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Default stats reporting interval.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Queue configuration.
///
/// Zero and empty values mean "use the default"; call [`QueueConfig::normalized`]
/// to resolve them. The queue constructors normalize automatically.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Queue name, also the key prefix in the shared store
    pub queue_name: String,

    /// Retry bound for jobs that don't set their own
    pub max_retries: u32,

    /// Base retry delay, multiplied by the attempt count
    pub retry_delay: Duration,

    /// Per-job execution deadline
    pub job_timeout: Duration,

    /// Expiration of job snapshots and results
    pub result_ttl: Duration,

    /// Workers started when `start_consuming` gets zero
    pub default_concurrency: usize,

    /// Worker poll interval
    pub poll_interval: Duration,

    /// Result TTL normalization interval
    pub cleanup_interval: Duration,

    /// Whether the stats loop runs
    pub stats_enabled: bool,

    /// Stats loop interval
    pub stats_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            result_ttl: DEFAULT_RESULT_TTL,
            default_concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            stats_enabled: false,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

impl QueueConfig {
    /// Create a configuration for the named queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    /// Set the retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the job timeout.
    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Set the result retention time.
    pub fn with_result_ttl(mut self, result_ttl: Duration) -> Self {
        self.result_ttl = result_ttl;
        self
    }

    /// Set the default concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the cleanup interval.
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    /// Enable the stats loop with the given interval.
    pub fn with_stats(mut self, interval: Duration) -> Self {
        self.stats_enabled = true;
        self.stats_interval = interval;
        self
    }

    /// Replace absent or zero values with the documented defaults.
    ///
    /// `max_retries` of zero also falls back to the default; jobs that must
    /// never be retried set `Job::max_retries` to `Some(0)` instead.
    pub fn normalized(mut self) -> Self {
        fn or_default(value: Duration, default: Duration) -> Duration {
            if value.is_zero() { default } else { value }
        }

        if self.queue_name.trim().is_empty() {
            self.queue_name = DEFAULT_QUEUE_NAME.to_string();
        }
        if self.max_retries == 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
        }
        if self.default_concurrency == 0 {
            self.default_concurrency = DEFAULT_CONCURRENCY;
        }
        self.retry_delay = or_default(self.retry_delay, DEFAULT_RETRY_DELAY);
        self.job_timeout = or_default(self.job_timeout, DEFAULT_JOB_TIMEOUT);
        self.result_ttl = or_default(self.result_ttl, DEFAULT_RESULT_TTL);
        self.poll_interval = or_default(self.poll_interval, DEFAULT_POLL_INTERVAL);
        self.cleanup_interval = or_default(self.cleanup_interval, DEFAULT_CLEANUP_INTERVAL);
        self.stats_interval = or_default(self.stats_interval, DEFAULT_STATS_INTERVAL);
        self
    }

    /// Key of the priority collection.
    pub fn queue_key(&self) -> String {
        self.key("queue")
    }

    /// Key of a job snapshot.
    pub fn job_key(&self, job_id: &str) -> String {
        self.key(&format!("job:{}", job_id))
    }

    /// Key of a job result.
    pub fn result_key(&self, job_id: &str) -> String {
        self.key(&format!("result:{}", job_id))
    }

    /// Pattern matching every result key of this queue.
    pub fn result_pattern(&self) -> String {
        self.result_key("*")
    }

    /// Build a store key.
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.queue_name, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = QueueConfig::default();
        assert_eq!(config.queue_name, "mem_bank_jobs");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(30));
        assert_eq!(config.job_timeout, Duration::from_secs(300));
        assert_eq!(config.result_ttl, Duration::from_secs(86400));
        assert_eq!(config.default_concurrency, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.cleanup_interval, Duration::from_secs(3600));
        assert!(!config.stats_enabled);
    }

    #[test]
    fn test_normalized_replaces_zero_values() {
        let config = QueueConfig {
            queue_name: String::new(),
            max_retries: 0,
            retry_delay: Duration::ZERO,
            job_timeout: Duration::ZERO,
            result_ttl: Duration::ZERO,
            default_concurrency: 0,
            poll_interval: Duration::ZERO,
            cleanup_interval: Duration::ZERO,
            stats_enabled: false,
            stats_interval: Duration::ZERO,
        }
        .normalized();

        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn test_normalized_keeps_explicit_values() {
        let config = QueueConfig::new("jobs")
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(10))
            .with_poll_interval(Duration::from_millis(5))
            .normalized();

        assert_eq!(config.queue_name, "jobs");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.poll_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_key_layout() {
        let config = QueueConfig::new("jobs");
        assert_eq!(config.queue_key(), "jobs:queue");
        assert_eq!(config.job_key("42"), "jobs:job:42");
        assert_eq!(config.result_key("42"), "jobs:result:42");
        assert_eq!(config.result_pattern(), "jobs:result:*");
    }

    #[test]
    fn test_with_stats() {
        let config = QueueConfig::new("jobs").with_stats(Duration::from_secs(5));
        assert!(config.stats_enabled);
        assert_eq!(config.stats_interval, Duration::from_secs(5));
    }
}
