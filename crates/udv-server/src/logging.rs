//! Structured logging for the UDV server
//!
//! Features:
//! - Structured JSON logging for production
//! - Human-readable console logging for development
//! - File rotation with daily log files
//! - Configurable log levels per module

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "udv-server.log";

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    /// Compact format for testing
    Compact,
}

impl LogFormat {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stdout only
    Stdout,
    /// Log to file only
    File,
    /// Log to both stdout and file
    Both,
}

impl LogOutput {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_OUTPUT").as_deref() {
            Ok("file") => LogOutput::File,
            Ok("both") => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

fn file_appender() -> RollingFileAppender {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&log_dir).ok();
    RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE)
}

/// Initialize the logging system
///
/// Environment variables:
/// - `RUST_LOG`: Log level (e.g., "debug", "info", "udv_server=debug,udv_dsl=trace")
/// - `LOG_FORMAT`: Output format ("pretty", "json", "compact")
/// - `LOG_OUTPUT`: Where to write logs ("stdout", "file", "both")
/// - `LOG_DIR`: Directory for log files (default: "./logs")
///
/// Examples:
/// ```bash
/// # Development: pretty console output at debug level
/// RUST_LOG=debug LOG_FORMAT=pretty cargo run -p udv-server
///
/// # Production: JSON to file with info level
/// RUST_LOG=info LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/udv cargo run -p udv-server
/// ```
pub fn init() -> anyhow::Result<()> {
    let format = LogFormat::from_env();
    let output = LogOutput::from_env();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        // Filter out noisy third-party crates
        .add_directive("hyper=warn".parse()?)
        .add_directive("tokio=warn".parse()?)
        .add_directive("tower=warn".parse()?)
        .add_directive("h2=warn".parse()?);

    let stdout_layer = match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    match output {
        LogOutput::Stdout => tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .try_init()?,
        LogOutput::File => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(file_appender()).with_ansi(false))
            .try_init()?,
        LogOutput::Both => tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .with(
                fmt::layer()
                    .with_writer(file_appender())
                    .with_ansi(false)
                    .boxed(),
            )
            .try_init()?,
    }

    tracing::info!(format = ?format, output = ?output, "Logging system initialized");
    if matches!(output, LogOutput::File | LogOutput::Both) {
        tracing::debug!(
            log_dir = %std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()),
            file = LOG_FILE,
            "Writing logs to file"
        );
    }

    Ok(())
}

/// Helper macro for logging with structured fields
///
/// Usage:
/// ```ignore
/// log_event!(
///     level: tracing::Level::INFO,
///     event: "query_translated",
///     request_id: "abc123",
///     elapsed_ms: 3,
///     params: 4
/// );
/// ```
#[macro_export]
macro_rules! log_event {
    (level: $level:expr, event: $event:expr $(, $key:ident: $value:expr)* $(,)?) => {
        tracing::event!(
            $level,
            event = $event
            $(, $key = ?$value)*
        );
    };
}
