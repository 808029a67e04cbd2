use std::io;

use thiserror::Error;

/// Errors returned across the litenet toolkit.
#[derive(Debug, Error)]
pub enum Error {
    /// A required pointer-like input was absent.
    #[error("null pointer")]
    NullPointer,
    /// An argument was out of range or otherwise unusable.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// An operation was attempted in a state that forbids it.
    #[error("logic error: {0}")]
    Logic(String),
    /// A runtime resource could not be acquired (thread spawn, timer host).
    #[error("runtime error: {0}")]
    Runtime(String),
    /// A cursor or read range escaped the valid region of a byte stream.
    #[error("access violation: {0}")]
    AccessViolation(String),
    /// Socket or epoll operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for an `InvalidParameter` with a formatted message.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Shorthand for the latest OS error on a failed libc call.
    pub(crate) fn last_os() -> Self {
        Error::Io(io::Error::last_os_error())
    }
}
