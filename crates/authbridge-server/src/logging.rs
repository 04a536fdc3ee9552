//! Logging initialization
//!
//! Logs go to stderr so stdout stays free for command output (login links,
//! profiles). `RUST_LOG` overrides the configured level.
//!
//! ```rust,no_run
//! use authbridge_server::LoggingConfig;
//!
//! LoggingConfig::from_verbosity(1, false).init()?;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `authbridge_auth=debug`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
        }
    }
}

impl LoggingConfig {
    /// Level from CLI verbosity flags
    ///
    /// `quiet` wins over any `-v`; otherwise 0 is `warn`, 1 `info`, 2 `debug`,
    /// 3 and up `trace`.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };
        Self {
            level: level.to_string(),
            ..Self::default()
        }
    }

    /// Switch to JSON output
    pub fn structured(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(&self) -> io::Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let subscriber = tracing_subscriber::registry().with(filter);

        if self.structured {
            subscriber
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))
        } else {
            subscriber
                .with(fmt::layer().with_target(false).with_writer(io::stderr))
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))
        }
    }
}
