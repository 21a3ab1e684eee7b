//! Configuration management for the daemon.

use crate::{CoreError, CoreResult, Paths};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Deepest loopback nesting a batch may reach before it is rejected.
    /// Unset means the dispatcher's own default.
    #[serde(default)]
    pub max_loopback_depth: Option<usize>,
    /// Socket to listen on. Falls back to `Paths::socket_file()`.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            max_loopback_depth: None,
            socket_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the base directory, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Apply `MUXD_LOG_LEVEL` and `MUXD_MAX_LOOPBACK_DEPTH` overrides.
    ///
    /// `lookup` resolves a variable name; `load` passes the process
    /// environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_level) = lookup("MUXD_LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Some(raw) = lookup("MUXD_MAX_LOOPBACK_DEPTH") {
            let depth = raw.trim().parse().map_err(|_| {
                CoreError::Config(format!("MUXD_MAX_LOOPBACK_DEPTH is not a number: {raw}"))
            })?;
            self.max_loopback_depth = Some(depth);
        }

        Ok(())
    }

    /// Socket the daemon listens on.
    pub fn socket_path(&self, paths: &Paths) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| paths.socket_file())
    }
}
