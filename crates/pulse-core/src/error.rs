//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a configuration.
///
/// All of these are fatal at startup; none can occur once workers run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid condition at {path}: {message}")]
    Condition { path: String, message: String },

    #[error("invalid duration '{value}' at {path}: {reason}")]
    InvalidDuration {
        path: String,
        value: String,
        reason: String,
    },

    #[error("{kind} with id '{id}' already exists")]
    Duplicate { kind: &'static str, id: String },

    #[error("{kind} '{id}' referenced by {referenced_by} not found")]
    UnknownReference {
        kind: &'static str,
        id: String,
        referenced_by: String,
    },

    #[error("service '{service}': threshold must be at least 1")]
    InvalidThreshold { service: String },

    #[error("invalid url '{url}' for {context}: {reason}")]
    InvalidUrl {
        context: String,
        url: String,
        reason: String,
    },

    #[error("invalid template for {context}: {reason}")]
    InvalidTemplate { context: String, reason: String },

    #[error("invalid {context}: {reason}")]
    Invalid { context: String, reason: String },
}
