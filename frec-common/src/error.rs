//! Common error types for frec
//!
//! Every variant maps onto exactly one of three client-facing kinds
//! (validation, not-found, storage) and one HTTP status.

use thiserror::Error;

/// Common result type for frec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client-facing classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, missing or disallowed client data
    Validation,
    /// An explicit reference did not resolve
    NotFound,
    /// Relational or filesystem failure
    Storage,
}

/// Common error types across frec crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or disallowed client data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Client referenced an id that does not exist (reported as 400)
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// Requested resource not found (reported as 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::Validation,
            Error::UnknownReference(_) | Error::NotFound(_) => ErrorKind::NotFound,
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::UnknownReference(_) => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Stable machine-readable code used in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "BAD_REQUEST",
            Error::UnknownReference(_) => "UNKNOWN_REFERENCE",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
