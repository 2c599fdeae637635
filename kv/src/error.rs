use std::fmt;

/// Errors produced by the versioned store, rate limiter and hit counter.
#[derive(Debug)]
pub enum Error {
    /// A key was empty where a non-empty key is required.
    EmptyKey,
    /// The requested key does not exist.
    NotFound(String),
    /// Wraps an I/O failure encountered by a caller of this crate.
    Io(std::io::Error),
    /// Catch-all for conditions that don't fit a more specific variant.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyKey => write!(f, "key must not be empty"),
            Error::NotFound(key) => write!(f, "key not found: {}", key),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Convenience alias used throughout this crate.
pub type CResult<T> = std::result::Result<T, Error>;
