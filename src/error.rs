//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared counter store errors
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
