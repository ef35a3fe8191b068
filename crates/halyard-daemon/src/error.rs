//! Error types for halyard-daemon

use halyard_control::ControlError;
use thiserror::Error;

/// Daemon error type
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file {path}: {reason}")]
    Seed { path: String, reason: String },

    #[error("Control error: {0}")]
    Control(#[from] ControlError),
}

impl From<config::ConfigError> for DaemonError {
    fn from(e: config::ConfigError) -> Self {
        DaemonError::Config(e.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
