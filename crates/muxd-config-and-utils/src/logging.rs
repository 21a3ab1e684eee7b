//! Logging initialization for the daemon.
//!
//! Thin wrapper over the observability crate that fixes the service name and
//! reads the output format from `MUXD_LOG_FORMAT` (`compact` or `json`).

use observability::{LogConfig, LogFormat};
use std::path::PathBuf;
use tracing::Level;

use crate::{CoreError, CoreResult};

/// Initialize the logging system for the daemon.
///
/// `RUST_LOG` overrides `level` when set. When `log_file` is given, every
/// line is also appended to it as JSONL.
pub fn init_logging(level: Level, log_file: Option<PathBuf>) {
    let format = std::env::var("MUXD_LOG_FORMAT")
        .map(|raw| LogFormat::parse(&raw))
        .unwrap_or_default();

    observability::init_with_config(LogConfig {
        service_name: "muxd".into(),
        default_level: level.as_str().to_ascii_lowercase(),
        format,
        log_path: log_file,
        also_stderr: true,
    });
}

/// Parse a configured log level (`--log-level`, `MUXD_LOG_LEVEL`, config file).
///
/// Unknown names are rejected so a typo does not silently change verbosity.
pub fn parse_level(level: &str) -> CoreResult<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(CoreError::Config(format!("unknown log level: {level:?}"))),
    }
}
