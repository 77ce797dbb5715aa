//! Logging setup for a booted plugin.
//!
//! The kernel emits `tracing` events everywhere. Hosts that have no
//! subscriber of their own can install one from a [`LogConfig`]:
//!
//! ```no_run
//! use bolge_core::logging::*;
//!
//! let _guard = LogConfig::for_environment("dev")
//!     .output(LogOutput::File("var/log/plugin.log".into()))
//!     .init()
//!     .ok();
//!
//! info!("Plugin logging ready");
//! ```

use crate::Error;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, one object per line
    Json,
    /// Human-readable single line
    Plain,
    /// Multi-line, for local development
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Append to a file, created if missing
    File(String),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub targets: bool,
    /// Overrides `level` when set, e.g. `"bolge_core=debug,sea_orm=warn"`
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for the `ENV` value of a plugin: verbose plain text in
    /// `dev`, JSON at info level otherwise.
    pub fn for_environment(env: &str) -> Self {
        if env == "dev" {
            Self::new().level(LogLevel::Debug).format(LogFormat::Plain)
        } else {
            Self::new()
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        }
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes buffered lines when dropped. Fails when the
    /// log file cannot be opened or a global subscriber is already set, which
    /// is common when the host application configured its own.
    pub fn init(self) -> Result<WorkerGuard, Error> {
        let (writer, guard) = match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
        };

        let filter = self.filter();
        let registry = tracing_subscriber::registry().with(filter);
        let layer = fmt::layer().with_writer(writer).with_target(self.targets);

        let installed = match self.format {
            LogFormat::Json => registry.with(layer.json()).try_init(),
            LogFormat::Plain => registry.with(layer.with_ansi(false)).try_init(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.compact().with_ansi(false)).try_init(),
        };

        installed.map_err(|e| Error::Internal(format!("Failed to install logger: {}", e)))?;
        Ok(guard)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            targets: true,
            env_filter: None,
        }
    }
}
