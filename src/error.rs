//! Error types for aiodb.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for aiodb operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The query file does not exist or cannot be opened for reading.
    #[error("Query file not found or unreadable: {}: {source}", .path.display())]
    ResourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The query file is not valid UTF-8.
    #[error("Query file is not valid UTF-8: {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: std::str::Utf8Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// No statement is stored under the requested key.
    #[error("No query found for key '{0}'")]
    QueryNotFound(String),

    /// A named placeholder has no bound value.
    #[error("Missing value for named parameter ':{0}'")]
    MissingParameter(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Create a query-not-found error for the given key.
    pub fn query_not_found(key: impl Into<String>) -> Self {
        Self::QueryNotFound(key.into())
    }

    pub(crate) fn execution(err: sqlx::Error) -> Self {
        Self::Execution(err.to_string())
    }

    pub(crate) fn connection(err: sqlx::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Result type alias for aiodb operations.
pub type DbResult<T> = Result<T, DbError>;
