// Settings document for mem_bank services

use crate::duration::serde_duration;
use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use membank_log::{Format, Level, LogConfig};
use membank_queue::QueueConfig;
use membank_queue::config::{
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_CONCURRENCY, DEFAULT_JOB_TIMEOUT, DEFAULT_MAX_RETRIES,
    DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_NAME, DEFAULT_RESULT_TTL, DEFAULT_RETRY_DELAY,
    DEFAULT_STATS_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub redis: RedisSettings,
    pub queue: QueueSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Deserialize settings from a merged document.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.redis.validate()?;
        self.queue.validate()?;
        self.log.validate()
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// Redis URL (redis://host:port or rediss://host:port for TLS)
    pub url: String,
    /// Username for Redis 6+ ACL
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database number
    #[serde(deserialize_with = "lenient::option")]
    pub database: Option<u8>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            username: None,
            password: None,
            database: None,
        }
    }
}

impl RedisSettings {
    /// Get the full Redis URL with auth and database.
    pub fn connection_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let mut rest = rest.to_string();

        if let Some(password) = &self.password
            && !rest.contains('@')
        {
            let user = self.username.as_deref().unwrap_or("");
            rest = format!("{}:{}@{}", user, password, rest);
        }

        if let Some(db) = self.database
            && !rest.contains('/')
        {
            rest = format!("{}/{}", rest, db);
        }

        format!("{}://{}", scheme, rest)
    }
}

impl Validate for RedisSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.url, "redis.url")?;
        ConfigValidator::has_scheme(&self.url, &["redis", "rediss"], "redis.url")
    }
}

/// Queue settings. Zero values fall back to the queue defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub queue_name: String,
    #[serde(deserialize_with = "lenient::deserialize")]
    pub max_retries: u32,
    #[serde(with = "serde_duration")]
    pub retry_delay: Duration,
    #[serde(with = "serde_duration")]
    pub job_timeout: Duration,
    #[serde(with = "serde_duration")]
    pub result_ttl: Duration,
    /// Signed so that a negative value is reported instead of wrapping
    #[serde(deserialize_with = "lenient::deserialize")]
    pub concurrency: i64,
    #[serde(with = "serde_duration")]
    pub poll_interval: Duration,
    #[serde(with = "serde_duration")]
    pub cleanup_interval: Duration,
    #[serde(deserialize_with = "lenient::deserialize")]
    pub stats_enabled: bool,
    #[serde(with = "serde_duration")]
    pub stats_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            result_ttl: DEFAULT_RESULT_TTL,
            concurrency: DEFAULT_CONCURRENCY as i64,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            stats_enabled: false,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

impl QueueSettings {
    /// Build a normalized queue configuration.
    pub fn into_queue_config(&self) -> QueueConfig {
        QueueConfig {
            queue_name: self.queue_name.clone(),
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            job_timeout: self.job_timeout,
            result_ttl: self.result_ttl,
            default_concurrency: self.concurrency.max(0) as usize,
            poll_interval: self.poll_interval,
            cleanup_interval: self.cleanup_interval,
            stats_enabled: self.stats_enabled,
            stats_interval: self.stats_interval,
        }
        .normalized()
    }
}

impl Validate for QueueSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::non_negative(self.concurrency, "queue.concurrency")
    }
}

/// Logging overrides applied on top of the environment-derived log config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: Option<String>,
    pub format: Option<String>,
    #[serde(deserialize_with = "lenient::deserialize")]
    pub debug: bool,
    #[serde(deserialize_with = "lenient::option")]
    pub color: Option<bool>,
}

impl LogSettings {
    /// Apply these settings to `base`.
    pub fn apply(&self, mut base: LogConfig) -> LogConfig {
        if let Some(level) = self.level.as_deref().and_then(Level::from_str) {
            base.level = level;
        }
        if let Some(format) = self.format.as_deref().and_then(Format::from_str) {
            base.format = format;
        }
        if let Some(color) = self.color {
            base.color = color;
        }
        base.debug |= self.debug;
        base
    }

    /// Log config built from defaults plus these settings.
    pub fn to_log_config(&self) -> LogConfig {
        self.apply(LogConfig::default())
    }
}

impl Validate for LogSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::parses(self.level.as_deref(), Level::from_str, "log.level")?;
        ConfigValidator::parses(self.format.as_deref(), Format::from_str, "log.format")
    }
}

/// Accept either a native value or its string form, as environment
/// variables only carry strings.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    fn resolve<T, E>(raw: Raw<T>) -> Result<T, E>
    where
        T: FromStr,
        T::Err: Display,
        E: serde::de::Error,
    {
        match raw {
            Raw::Value(value) => Ok(value),
            Raw::Text(text) => text.trim().parse().map_err(E::custom),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: Display,
    {
        resolve(Raw::deserialize(deserializer)?)
    }

    pub fn option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: Display,
    {
        Option::<Raw<T>>::deserialize(deserializer)?
            .map(resolve)
            .transpose()
    }
}
