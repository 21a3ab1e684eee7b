//! # Observability
//!
//! Centralized logging setup for muxd services.
//!
//! Services call [`init`] or [`init_with_config`] once at startup and use the
//! standard `tracing` macros everywhere else. Where the lines end up (stderr,
//! a JSONL file, both) is decided here and nowhere else.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "muxd".into(),
//!         default_level: "debug".into(),
//!         format: observability::LogFormat::Json,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("service started");
//! }
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogLine};
pub use writer::{FileLogWriter, WriterFactory};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse a format name (case-insensitive). Unknown names fall back to compact.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSON log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Output format.
    pub format: LogFormat,

    /// Optional JSONL file that receives every log line in addition to stderr.
    pub log_path: Option<PathBuf>,

    /// Emit logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            format: LogFormat::Compact,
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once is harmless: only the first subscriber is
/// installed. A log file that cannot be opened is reported on the installed
/// subscriber and otherwise ignored.
pub fn init_with_config(config: LogConfig) {
    let file_writer = match config.log_path.as_ref().map(FileLogWriter::new) {
        Some(Ok(writer)) => Some(writer),
        Some(Err(error)) => {
            eprintln!("failed to open log file: {}", error);
            None
        }
        None => None,
    };

    let file_layer = file_writer.map(|writer| {
        JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
            .with_filter(env_filter(&config.default_level))
    });

    let stderr_json = (config.also_stderr && config.format == LogFormat::Json).then(|| {
        JsonLayer::new(config.service_name.clone(), std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let stderr_compact = (config.also_stderr && config.format == LogFormat::Compact).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_json)
        .with(stderr_compact)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            format = ?config.format,
            log_path = ?config.log_path,
            "observability initialized"
        );
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.log_path.is_none());
        assert!(config.also_stderr);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSONL"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" compact "), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Compact);
        assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init("first");
        init("second");
    }
}
