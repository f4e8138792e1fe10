//! Error types for the Dicebank service
//!
//! Storage and configuration errors live here together with the root error
//! used by startup code. Request-path errors (operations, auth, sessions)
//! sit next to the code that raises them.

use crate::account::PlayerId;
use thiserror::Error;

/// Root error type for service construction and startup
#[derive(Debug, Error)]
pub enum DiceBankError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Balance store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("player with ID {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("player name '{0}' already exists")]
    DuplicateName(String),

    #[error("Database open failed: {0}")]
    OpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::WriteFailed(e.to_string())
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience type alias for Results
pub type DiceBankResult<T> = Result<T, DiceBankError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = DiceBankError::from(ConfigError::invalid("session.idle_timeout_ms", 0, "must be > 0"));
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("session.idle_timeout_ms"));
    }

    #[test]
    fn test_player_not_found_message() {
        let err = StoreError::PlayerNotFound(PlayerId(7));
        assert_eq!(err.to_string(), "player with ID 7 not found");
    }

    #[test]
    fn test_error_source() {
        let err = DiceBankError::Storage(StoreError::ReadFailed("disk".into()));
        assert!(err.source().is_some());
    }
}
