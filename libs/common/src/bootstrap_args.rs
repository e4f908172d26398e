//! Command-line arguments for the Modbus slave service
//!
//! Every field here overrides the matching value from the layered
//! configuration (file, then environment).

use std::path::PathBuf;

#[cfg(feature = "cli")]
use clap::Parser;

/// Service startup arguments
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Configuration file (YAML); defaults to config/<service>.yaml when present
    #[cfg_attr(feature = "cli", clap(short = 'c', long, env = "MBSRV_CONFIG"))]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[cfg_attr(feature = "cli", clap(short = 'l', long))]
    pub log_level: Option<String>,

    /// Override the first TCP listener address (e.g., 0.0.0.0:1502)
    #[cfg_attr(feature = "cli", clap(short = 'b', long))]
    pub bind: Option<String>,

    /// Log every served request at info level
    #[cfg_attr(feature = "cli", clap(short = 'v', long))]
    pub verbose: bool,

    /// Enable debug mode (debug log level unless --log-level is given)
    #[cfg_attr(feature = "cli", clap(long))]
    pub debug: bool,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,
}

impl ServiceArgs {
    /// Parse log level string to tracing::Level
    pub fn parse_log_level(&self) -> tracing::Level {
        match self.effective_log_level().as_deref() {
            Some(level) => match level.to_lowercase().as_str() {
                "trace" => tracing::Level::TRACE,
                "debug" => tracing::Level::DEBUG,
                "warn" | "warning" => tracing::Level::WARN,
                "error" => tracing::Level::ERROR,
                _ => tracing::Level::INFO,
            },
            None => tracing::Level::INFO,
        }
    }

    /// Explicit `--log-level` wins; `--debug` implies `debug`.
    pub fn effective_log_level(&self) -> Option<String> {
        match (&self.log_level, self.debug) {
            (Some(level), _) => Some(level.clone()),
            (None, true) => Some("debug".to_string()),
            (None, false) => None,
        }
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.debug || matches!(self.log_level.as_deref(), Some("debug" | "trace"))
    }
}
