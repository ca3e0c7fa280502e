//! Server settings
//!
//! Read once at startup from an optional JSON file. Missing fields take
//! their defaults, so `{}` is a valid settings file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Environment variable consulted when no path is given on the command line.
pub const CONFIG_ENV: &str = "BLOCKFIT_CONFIG";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP listener binds to.
    pub bind_address: String,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// How long a client may take to send a complete request.
    pub read_timeout_ms: u64,
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
            max_body_bytes: 64 * 1024,
            read_timeout_ms: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.log_level()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Load from `path`, else from `$BLOCKFIT_CONFIG`, else defaults.
    pub fn resolve(path: Option<PathBuf>) -> Result<Self, SettingsError> {
        match path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn log_level(&self) -> Result<Level, SettingsError> {
        self.log_level
            .parse()
            .map_err(|_| SettingsError::InvalidLogLevel(self.log_level.clone()))
    }
}
