//! Layered settings for mem_bank services.
//!
//! Sources, lowest precedence first:
//!
//! 1. an optional TOML or JSON file;
//! 2. a `.env` file (read without modifying the process environment);
//! 3. process environment variables;
//! 4. variables passed to [`SettingsLoader::with_vars`].
//!
//! Variables use the `MEMBANK_` prefix and `__` between sections, so
//! `MEMBANK_QUEUE__RETRY_DELAY=10s` sets `queue.retry_delay`.
//!
//! ```no_run
//! use membank_config::{Settings, SettingsLoader};
//!
//! # fn main() -> membank_config::Result<()> {
//! let settings: Settings = SettingsLoader::new().with_file("membank.toml").load()?;
//! let queue_config = settings.queue.into_queue_config();
//! let redis_url = settings.redis.connection_url();
//! # let _ = (queue_config, redis_url);
//! # Ok(())
//! # }
//! ```

pub mod duration;
pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use duration::{format_duration, parse_duration};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{FileFormat, FileLoader};
pub use settings::{LogSettings, QueueSettings, RedisSettings, Settings};
pub use validation::{ConfigValidator, Validate};

use membank_log::debug;
use std::collections::HashMap;
use std::path::PathBuf;

/// Default prefix of environment variables.
pub const ENV_PREFIX: &str = "MEMBANK";

#[derive(Debug, Clone)]
enum DotenvSource {
    Discover,
    Path(PathBuf),
    Disabled,
}

/// Builds [`Settings`] from files and environment.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    dotenv: DotenvSource,
    prefix: String,
    process_env: bool,
    vars: HashMap<String, String>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Loader with `.env` discovery and process environment enabled.
    pub fn new() -> Self {
        Self {
            file: None,
            dotenv: DotenvSource::Discover,
            prefix: ENV_PREFIX.to_string(),
            process_env: true,
            vars: HashMap::new(),
        }
    }

    /// Read a settings file; the format follows the extension.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Read a specific `.env` file instead of discovering one.
    pub fn with_dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = DotenvSource::Path(path.into());
        self
    }

    /// Skip `.env` files.
    pub fn without_dotenv(mut self) -> Self {
        self.dotenv = DotenvSource::Disabled;
        self
    }

    /// Ignore the process environment.
    pub fn without_process_env(mut self) -> Self {
        self.process_env = false;
        self
    }

    /// Use a different variable prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Add variables on top of every other source.
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Merge every source, deserialize and validate.
    pub fn load(&self) -> Result<Settings> {
        let mut document = serde_json::Value::Object(serde_json::Map::new());

        if let Some(path) = &self.file {
            let data = FileLoader::auto(path)?.load_file(path)?;
            loader::merge(&mut document, data);
            debug!(path = %path.display(), "Loaded settings file");
        }

        let mut vars = self.dotenv_vars()?;
        if self.process_env {
            vars.extend(EnvLoader::process_vars());
        }
        vars.extend(self.vars.clone());

        loader::merge(&mut document, EnvLoader::new(&self.prefix).overlay(vars));

        let settings = Settings::from_value(document)?;
        settings.validate()?;
        Ok(settings)
    }

    fn dotenv_vars(&self) -> Result<HashMap<String, String>> {
        match &self.dotenv {
            DotenvSource::Disabled => Ok(HashMap::new()),
            DotenvSource::Path(path) => EnvLoader::dotenv_vars(path),
            DotenvSource::Discover => match dotenvy::dotenv_iter() {
                Ok(iter) => {
                    let mut vars = HashMap::new();
                    for item in iter {
                        let (key, value) = item?;
                        vars.insert(key, value);
                    }
                    Ok(vars)
                }
                Err(e) if e.not_found() => Ok(HashMap::new()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

impl Settings {
    /// Load settings from `.env` and the environment.
    pub fn load() -> Result<Self> {
        SettingsLoader::new().load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated() -> SettingsLoader {
        SettingsLoader::new().without_dotenv().without_process_env()
    }

    #[test]
    fn test_empty_sources_give_defaults() {
        let settings = isolated().load().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_vars_override() {
        let settings = isolated()
            .with_vars([
                ("MEMBANK_QUEUE__MAX_RETRIES", "7"),
                ("MEMBANK_QUEUE__RETRY_DELAY", "1h30m"),
                ("MEMBANK_REDIS__URL", "redis://cache:6379"),
            ])
            .load()
            .unwrap();

        assert_eq!(settings.queue.max_retries, 7);
        assert_eq!(
            settings.queue.retry_delay,
            std::time::Duration::from_secs(5400)
        );
        assert_eq!(settings.redis.url, "redis://cache:6379");
    }

    #[test]
    fn test_custom_prefix() {
        let settings = isolated()
            .with_prefix("APP")
            .with_vars([("APP_QUEUE__QUEUE_NAME", "app_jobs"), ("MEMBANK_QUEUE__QUEUE_NAME", "x")])
            .load()
            .unwrap();
        assert_eq!(settings.queue.queue_name, "app_jobs");
    }

    #[test]
    fn test_invalid_settings_fail_validation() {
        let err = isolated()
            .with_vars([("MEMBANK_QUEUE__CONCURRENCY", "-3")])
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
