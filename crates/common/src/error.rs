//! Error types for railguide

use thiserror::Error;

/// Result type alias using railguide Error
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown viewport preset: {0}")]
    UnknownViewport(String),
}
