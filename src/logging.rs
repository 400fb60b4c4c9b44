//! Logging setup for programs built on the engine.
//!
//! The library itself only emits `tracing` events; nothing is installed
//! globally until a program calls [`init_logging`]. Stage modules log under
//! their module path, so filters such as
//! `RUST_LOG=navcycle_core::state_space=debug` select a single stage.

use crate::error::{CycleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Single-line output
    #[default]
    Compact,
    /// JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default level directive, overridden by `RUST_LOG` when set
    pub level: String,
    /// Format of the stderr stream
    pub format: LogFormat,
    /// Optional log file; its parent directory is created if missing
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file: None,
        }
    }
}

impl LogConfig {
    /// Check that the level directive parses.
    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| CycleError::Configuration(format!("invalid log level '{}': {e}", self.level)))
    }
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| CycleError::Configuration(format!("invalid log level '{level}': {e}"))),
    }
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path.file_name().ok_or_else(|| {
        CycleError::Configuration(format!("log file path has no file name: {}", path.display()))
    })?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber.
///
/// Returns the file writer guard when a log file is configured; keep it alive
/// for the lifetime of the program so buffered lines are flushed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let stderr_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_filter(build_filter(&config.level)?)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(build_filter(&config.level)?)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(build_filter(&config.level)?)
            .boxed(),
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![stderr_layer];
    let mut guard = None;
    if let Some(path) = &config.file {
        let (writer, file_guard) = file_writer(path)?;
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(build_filter(&config.level)?)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| CycleError::Configuration(format!("logging already initialized: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LogConfig {
            level: "navcycle_core=loud".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CycleError::Configuration(_))
        ));
    }

    #[test]
    fn test_format_deserializes_snake_case() {
        let config: LogConfig = toml::from_str("format = \"json\"\nlevel = \"debug\"").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");
        assert!(config.file.is_none());
    }
}
