//! Error types for the Lazarillo assistant core

use thiserror::Error;

/// Result type alias for Lazarillo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or transport failure talking to the model API
    #[error("network error: {0}")]
    Network(String),

    /// Authentication/authorization error from the model API
    #[error("auth error: {0}")]
    Auth(String),

    /// The model declined to answer (safety block or empty candidate)
    #[error("model refusal: {0}")]
    ModelRefusal(String),

    /// Model response did not have the expected shape
    #[error("response parse error: {0}")]
    Parse(String),

    /// Speech recognition failure
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Listening or speaking was cancelled on purpose
    #[error("cancelled")]
    Cancelled,

    /// A turn is already being processed or spoken
    #[error("a turn is already in progress")]
    TurnInProgress,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
