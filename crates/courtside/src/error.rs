//! Error types for Courtside

use thiserror::Error;

/// Main error type for Courtside operations
#[derive(Error, Debug)]
pub enum CourtsideError {
    /// Configuration errors (unreadable file, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// History storage errors (SQLite, lock poisoning)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Provider construction errors (HTTP client setup, invalid endpoint)
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),
}

impl From<rusqlite::Error> for CourtsideError {
    fn from(e: rusqlite::Error) -> Self {
        CourtsideError::Storage(e.to_string())
    }
}

/// Result type alias for Courtside operations
pub type Result<T> = std::result::Result<T, CourtsideError>;
