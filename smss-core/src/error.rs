//! Error types for the SMSS core library.

use thiserror::Error;

/// Top-level error type for all maintenance operations.
#[derive(Error, Debug)]
pub enum SmssError {
    /// The store rejected a query or statement.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An id-list filter was requested with no ids in it.
    #[error("Refusing to build an empty {what} id filter")]
    EmptyFilter {
        /// Which id list was empty.
        what: &'static str,
    },

    /// The configuration document could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, SmssError>;
