//! Error Handling Module
//!
//! Provides standardized error types for Kestrel. `StorageError` covers the
//! storage engine and append log; `CommandError` produces protocol-ready
//! error strings of the form `ERR message`.

use std::fmt;
use thiserror::Error;

/// Error type for storage and persistence operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("append log error: {0}")]
    Aol(String),

    #[error("invalid type or format: {0}")]
    InvalidType(String),

    #[error("operation overflow: {0}")]
    Overflow(String),

    #[error("resource busy: {0}")]
    Busy(String),
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error categories for command failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic error
    Err,
    /// Syntax error in command arguments
    Syntax,
    /// Not an integer error
    NotInteger,
    /// Invalid arguments error
    InvalidArgs,
    /// Unknown command error
    UnknownCommand,
}

impl ErrorKind {
    /// Returns the wire prefix for this error kind
    pub fn prefix(&self) -> &'static str {
        // All currently supported kinds map to the generic prefix.
        "ERR"
    }
}

/// Error type for command parsing and execution.
///
/// Displays as `PREFIX message`, ready to be wrapped in an error frame.
#[derive(Debug, Clone)]
pub struct CommandError {
    kind: ErrorKind,
    message: String,
}

impl CommandError {
    /// Create a new command error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Wrong number of arguments for a command
    pub fn wrong_arity(command: &str) -> Self {
        Self::new(
            ErrorKind::InvalidArgs,
            format!("wrong number of arguments for '{}' command", command),
        )
    }

    /// Unknown command
    pub fn unknown_command(command: &str) -> Self {
        Self::new(
            ErrorKind::UnknownCommand,
            format!("unknown command '{}'", command),
        )
    }

    /// Top-level frame is not a non-empty array
    pub fn invalid_command() -> Self {
        Self::new(ErrorKind::Err, "invalid command")
    }

    /// Value is not an integer or out of range
    pub fn not_integer() -> Self {
        Self::new(
            ErrorKind::NotInteger,
            "value is not an integer or out of range",
        )
    }

    /// Syntax error
    pub fn syntax() -> Self {
        Self::new(ErrorKind::Syntax, "syntax error")
    }

    /// Generic error with custom message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Err, message)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.prefix(), self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<StorageError> for CommandError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidType(_) | StorageError::Overflow(_) => Self::not_integer(),
            StorageError::Busy(msg) => Self::generic(msg),
            other => Self::generic(other.to_string()),
        }
    }
}
