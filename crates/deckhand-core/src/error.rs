//! Error types for deckhand-core.

use thiserror::Error;

use crate::resolver::ResolutionError;

/// Result type alias using deckhand-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for deckhand operations
#[derive(Error, Debug)]
pub enum Error {
    // Dependency resolution errors
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: String, message: String },

    // Database errors
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this error came from dependency resolution
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }
}
