//! Error types shared across powercycle crates.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid or unreadable configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A single device command that was not accepted by the device port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command rejected with status {status}")]
    Rejected { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Alert delivery failure. Logged by the driver, never propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("alert rejected with status {status}")]
    Rejected { status: u16 },

    #[error("alert delivery failed: {0}")]
    Delivery(String),
}
