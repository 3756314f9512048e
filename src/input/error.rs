//! Configuration input errors.

use std::convert::From;
use std::error;
use std::fmt;
use std::fmt::Display;

/// Errors from reading the daemon's configuration.
#[derive(Debug)]
pub enum Error {
    /// Input format error with provided input.
    Format(String),
    /// A required setting is absent.
    Missing(&'static str),
    /// I/O error.
    IO(std::io::Error),
    /// JSON syntax error.
    JSON(serde_json::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        use Error::*;
        match self {
            IO(ref e) => Some(e),
            JSON(ref e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            Format(ref msg) => write!(f, "input format error: {}", msg),
            Missing(key) => write!(f, "configuration does not specify '{}'", key),
            IO(ref e) => write!(f, "I/O error: {}", e),
            JSON(ref e) => write!(f, "JSON parsing failure: {}", e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IO(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JSON(e)
    }
}
