//! Database error types.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// The database has been closed.
    #[error("database closed")]
    Closed,

    /// A stored value could not be decoded.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The storage engine failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DatabaseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
