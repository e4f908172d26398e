//! Unified logging module
//!
//! Console output uses the bracketed level format shared by every binary in
//! the workspace; file output (optional) rolls daily through `tracing-appender`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use errors::{SlaveError, SlaveResult};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809123Z [INFO] Listening on 0.0.0.0:502`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Logging section of the service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `debug`, `info,voltage_mbserver=trace`, ...)
    pub level: String,
    /// Directory for daily-rolling log files; no file output when unset
    pub dir: Option<PathBuf>,
    /// Write to stdout
    pub console: bool,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            console: true,
            ansi: true,
        }
    }
}

// Keeps the non-blocking file writer alive for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Resolve the effective filter: `RUST_LOG` wins over the configured level.
fn filter_spec(config: &LoggingConfig) -> String {
    match std::env::var("RUST_LOG") {
        Ok(env) if !env.trim().is_empty() => env,
        _ => config.level.clone(),
    }
}

/// File name prefix for the daily files: `{service}.YYYY-MM-DD.log`
fn file_appender(service_name: &str, dir: &Path) -> SlaveResult<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(service_name)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| SlaveError::Configuration(format!("log file appender: {}", e)))
}

/// Initialize the global subscriber
///
/// Can only succeed once per process.
pub fn init_logging(service_name: &str, config: &LoggingConfig) -> SlaveResult<()> {
    let spec = filter_spec(config);
    let env_filter = EnvFilter::try_new(&spec)
        .map_err(|e| SlaveError::Configuration(format!("invalid log level '{}': {}", spec, e)))?;

    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_ansi(config.ansi)
            .event_format(BracketedLevelFormat)
            .boxed()
    });

    let file_layer = match &config.dir {
        Some(dir) => {
            let appender = file_appender(service_name, dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
            match guards.lock() {
                Ok(mut guards) => guards.push(guard),
                Err(poisoned) => poisoned.into_inner().push(guard),
            }
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed(),
            )
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SlaveError::Configuration(format!("logging already initialized: {}", e)))?;

    tracing::info!(
        "Logging: {} level={} dir={:?}",
        service_name,
        spec,
        config.dir
    );
    Ok(())
}
