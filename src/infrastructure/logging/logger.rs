//! Structured logging setup: tracing-subscriber + tracing-appender +
//! env-filter, trimmed of rotation/retention policy since `LoggingConfig`
//! names a single fixed log file rather than a managed directory.

use anyhow::Result;
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::domain::models::config::{LogFormat, LoggingConfig};

/// Holds the non-blocking writer guard alive for the process lifetime.
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;
        let env_filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let guard = if let Some(ref path) = config.file_path {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map_or_else(|| "ralph.log".to_string(), |n| n.to_string_lossy().to_string());
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);

            match config.format {
                LogFormat::Json => {
                    let stdout_layer = tracing_subscriber::fmt::layer().json().with_writer(io::stdout);
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(file_layer)
                        .with(stdout_layer)
                        .init();
                }
                LogFormat::Pretty => {
                    let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout);
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(file_layer)
                        .with(stdout_layer)
                        .init();
                }
            }
            Some(guard)
        } else {
            match config.format {
                LogFormat::Json => {
                    let stdout_layer = tracing_subscriber::fmt::layer().json().with_writer(io::stdout);
                    tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
                }
                LogFormat::Pretty => {
                    let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout);
                    tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
                }
            }
            None
        };

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            file_output = config.file_path.is_some(),
            "logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("invalid log level: {level}"),
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn};
