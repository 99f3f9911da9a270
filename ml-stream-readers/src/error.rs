//! Error types for shard readers

use std::io;

use thiserror::Error;

/// Error type for shard readers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] ml_stream_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed shard content
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for shard readers
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ml_stream_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(core) => core,
            Error::Io(io) => ml_stream_core::Error::Io(io),
            Error::InvalidArgument(message) => ml_stream_core::Error::InvalidArgument(message),
            other => ml_stream_core::Error::Io(io::Error::new(io::ErrorKind::InvalidData, other.to_string())),
        }
    }
}
