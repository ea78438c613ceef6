//! Crate-wide error type.
//!
//! Per-tick failures on a single source are logged at the call site and
//! localized; only startup and sink errors are expected to travel far.

use std::fmt;
use std::io;

use crate::collector::parser::ParseError;

/// Error type shared by the recorder, the trace writer and the collectors.
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure.
    Io(io::Error),
    /// A proc file did not parse.
    Parse(ParseError),
    /// The record type was already registered.
    AlreadyRegistered(&'static str),
    /// The record type was never registered.
    UnknownType(&'static str),
    /// Invalid caller-supplied argument or state.
    InvalidArgument(&'static str),
    /// The resource is already open.
    AlreadyOpen,
    /// The resource is not open.
    NotOpen,
    /// Process or path lookup came up empty.
    NotFound,
    /// Data not available this tick; retry on the next one.
    Transient,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(e) => write!(f, "{}", e),
            Error::AlreadyRegistered(name) => {
                write!(f, "record type '{}' already registered", name)
            }
            Error::UnknownType(name) => write!(f, "record type '{}' not registered", name),
            Error::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            Error::AlreadyOpen => write!(f, "already open"),
            Error::NotOpen => write!(f, "not open"),
            Error::NotFound => write!(f, "not found"),
            Error::Transient => write!(f, "data not available this tick"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(e: nix::errno::Errno) -> Self {
        Error::Io(e.into())
    }
}
