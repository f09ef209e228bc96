//! Logging setup for mem_bank services.
//!
//! Installs a `tracing` subscriber configured from `MEMBANK_*` environment
//! variables. Libraries in this workspace only emit events through the
//! re-exported macros; the binary calls [`init`] once at startup.
//!
//! # Usage
//!
//! ```rust
//! use membank_log::{Format, Level, LogConfig};
//!
//! let config = LogConfig::default()
//!     .with_level(Level::Debug)
//!     .with_format(Format::Compact);
//!
//! tracing::subscriber::with_default(membank_log::subscriber(&config), || {
//!     tracing::info!(job_id = "42", "Job enqueued");
//! });
//! ```
//!
//! # Environment Variables
//!
//! - `MEMBANK_DEBUG=1` - Enable debug logging
//! - `MEMBANK_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `MEMBANK_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `MEMBANK_LOG_COLOR=1|0` - Enable/disable colors
//! - `MEMBANK_LOG_MODULE=1|0` - Include the event target
//! - `RUST_LOG` - Full filter directives; overrides the level when set
//!
//! The crate also re-exports the `tracing` event macros, so workspace crates
//! log through `membank_log::{info, warn, ..}`.

pub use tracing::{debug, error, info, trace, warn};

use once_cell::sync::Lazy;
use std::env;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter, time::ChronoUtc};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum severity that gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Get level from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Filter directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// One JSON object per event
    Json,
}

impl Format {
    /// Get format from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Global configuration (lazy initialized from the environment).
static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled (ignored for JSON)
    pub color: bool,
    /// Whether to include the event target
    pub module_path: bool,
    /// Filter directives (`RUST_LOG` syntax); replace the level when set
    pub directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            module_path: true,
            directives: None,
        }
    }
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("MEMBANK_DEBUG").is_some_and(|v| flag(&v));

        let level = lookup("MEMBANK_LOG_LEVEL")
            .and_then(|s| Level::from_str(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("MEMBANK_LOG_FORMAT")
            .and_then(|s| Format::from_str(&s))
            .unwrap_or(Format::Json);

        let color = lookup("MEMBANK_LOG_COLOR")
            .map(|v| flag(&v))
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let module_path = lookup("MEMBANK_LOG_MODULE").is_none_or(|v| flag(&v));

        let directives = lookup("RUST_LOG").filter(|v| !v.trim().is_empty());

        Self {
            debug,
            level,
            format,
            color,
            module_path,
            directives,
        }
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable colors.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Effective level, accounting for debug mode.
    pub fn effective_level(&self) -> Level {
        if self.debug && self.level > Level::Debug {
            Level::Debug
        } else {
            self.level
        }
    }

    /// Set filter directives such as `membank_queue=debug,info`.
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    // Invalid directives fall back to the level.
    fn filter(&self) -> EnvFilter {
        self.directives
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(self.effective_level().as_directive()))
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Check if debug logging is enabled.
pub fn is_debug_enabled() -> bool {
    config().effective_level() <= Level::Debug
}

/// Install the global subscriber from the environment.
///
/// Does nothing if a subscriber is already installed.
pub fn init() {
    let _ = try_init();
}

/// Install the global subscriber from the environment.
///
/// Fails if a global subscriber is already set.
pub fn try_init() -> Result<(), TryInitError> {
    subscriber(config()).try_init()
}

type Filtered = Layered<EnvFilter, Registry>;

/// Build a subscriber writing to stderr.
pub fn subscriber(config: &LogConfig) -> impl tracing::Subscriber + Send + Sync + 'static {
    subscriber_with_writer(config, std::io::stderr)
}

/// Build a subscriber writing to `writer`.
pub fn subscriber_with_writer<W>(
    config: &LogConfig,
    writer: W,
) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(config.module_path)
        .with_timer(ChronoUtc::rfc_3339());

    let output: Box<dyn Layer<Filtered> + Send + Sync> = match config.format {
        Format::Json => base.json().with_current_span(true).boxed(),
        Format::Pretty => base.pretty().with_ansi(config.color).boxed(),
        Format::Compact => base.compact().with_ansi(config.color).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(output)
}

// ============================================================================
// Tests
// ============================================================================
