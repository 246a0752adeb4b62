//! Common error types for foldersync.

use thiserror::Error;

/// Top-level error type for foldersync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal failed.
    #[error("Walk error: {0}")]
    Walk(String),

    /// A relative path could not be constructed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A background task failed to complete.
    #[error("Task error: {0}")]
    Task(String),
}

impl Error {
    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
