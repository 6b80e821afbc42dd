//! Error types for Reelcraft.

use thiserror::Error;

/// Main error type for Reelcraft operations.
#[derive(Error, Debug)]
pub enum ReelcraftError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Reelcraft operations.
pub type Result<T> = std::result::Result<T, ReelcraftError>;
