//! Structured logging for rowscript
//!
//! All pipeline logs use structured fields so a run can be followed
//! through compile, load, evaluate and persist.
//!
//! # Log Format Conventions
//!
//! - `operation`: The pipeline step ("compile", "load", "evaluate", "sweep", "persist")
//! - `status`: The result status ("success", "error", "timeout")
//! - `consumer`: The record type a module was compiled for (e.g., "stock_quote")
//! - `script_hash`: Content hash of the composed source
//! - `record_id`: Record being evaluated
//! - `duration_ms`: Elapsed time of the step
//!
//! # Examples
//!
//! ```rust
//! use tracing::info;
//!
//! # let hash = 17;
//! info!(
//!     operation = "load",
//!     consumer = "stock_quote",
//!     script_hash = hash,
//!     duration_ms = 3u64,
//!     "module loaded"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Environment variable selecting the log format
pub const LOG_FORMAT_ENV: &str = "ROWSCRIPT_LOG_FORMAT";

/// Shows "rowscript" instead of the full module path
struct RowscriptFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for RowscriptFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:5}(rowscript)\x1b[0m: ", level_style, meta.level())?;
        } else {
            write!(writer, "{:5}(rowscript): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact format (for CI)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse from environment variable (ROWSCRIPT_LOG_FORMAT)
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV)
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ => {
                if std::env::var("CI").is_ok() {
                    Self::Compact
                } else {
                    Self::Pretty
                }
            }
        }
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "info", "warn")
/// - `ROWSCRIPT_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match LogFormat::from_env() {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .event_format(RowscriptFormatter { with_ansi: true })
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .event_format(RowscriptFormatter { with_ansi: false })
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_ansi(false)
                        .with_writer(io::stderr)
                        .json(),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_log_format_from_env() {
        std::env::set_var(LOG_FORMAT_ENV, "JSON");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);

        std::env::set_var(LOG_FORMAT_ENV, "compact");
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);

        std::env::set_var(LOG_FORMAT_ENV, "pretty");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);

        std::env::remove_var(LOG_FORMAT_ENV);
    }

    #[test]
    #[serial]
    fn test_ci_defaults_to_compact() {
        std::env::remove_var(LOG_FORMAT_ENV);
        let ci = std::env::var("CI").ok();

        std::env::set_var("CI", "true");
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);

        match ci {
            Some(value) => std::env::set_var("CI", value),
            None => std::env::remove_var("CI"),
        }
    }
}
