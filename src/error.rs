use std::fmt;
use std::io;

/// Unified error type for the storage engine.
#[derive(Debug)]
pub enum Error {
    /// IO error from disk operations.
    Io(io::Error),
    /// Data corruption detected (CRC mismatch, bad format, out-of-order LSN).
    Corruption(String),
    /// An operation named an index the store does not know.
    UnknownIndex(String),
    /// Caller supplied something the engine cannot accept.
    InvalidArgument(String),
    /// Compaction of one index failed; its previous immutable index is still in place.
    CompactionAborted { index: String, source: Box<Error> },
    /// A commit failed earlier. The log refuses further writes.
    LogFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Corruption(msg) => write!(f, "Corruption: {msg}"),
            Error::UnknownIndex(name) => write!(f, "Unknown index: {name}"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Error::CompactionAborted { index, source } => {
                write!(f, "Compaction of index {index} aborted: {source}")
            }
            Error::LogFailed => write!(f, "Log unusable after a failed commit"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::CompactionAborted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
