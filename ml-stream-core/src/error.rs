//! Error types for streaming data pipelines

use std::io;
use thiserror::Error;

use crate::schema::DataType;
use crate::shard::ShardId;

/// Result type for streaming pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for streaming pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// The resource behind a shard could not be read
    #[error("Source unavailable (shard {shard}): {reason}")]
    SourceUnavailable {
        /// Shard whose resource failed
        shard: ShardId,
        /// Description of the underlying failure
        reason: String,
    },

    /// A rename, remove, select or cast referenced a column that does not exist
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// A value cannot be losslessly reinterpreted under the target type
    #[error("Incompatible cast: column '{column}' value {value} cannot be cast to {to}")]
    IncompatibleCast {
        /// Column holding the value
        column: String,
        /// Rendering of the offending value
        value: String,
        /// Requested type
        to: DataType,
    },

    /// Shard order was fixed by a take/skip view and can no longer change
    #[error("Shuffle locked: shard order is fixed by a take/skip view")]
    ShuffleLocked,

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Columns of a batch ended up with different lengths
    #[error("Column length mismatch: column '{column}' has {actual} values, expected {expected}")]
    ColumnLengthMismatch {
        /// Offending column
        column: String,
        /// Length of the first column
        expected: usize,
        /// Length of the offending column
        actual: usize,
    },

    /// A user supplied map or filter function failed
    #[error("Transformation error: {0}")]
    Transformation(String),

    /// IO error while reading a shard
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a transformation error from any displayable message
    pub fn transformation(message: impl std::fmt::Display) -> Self {
        Error::Transformation(message.to_string())
    }

    /// Attribute this error to a shard
    ///
    /// Errors raised while a shard is opened or read become
    /// [`Error::SourceUnavailable`]; errors already attributed keep their shard.
    #[must_use]
    pub fn at_shard(self, shard: ShardId) -> Self {
        match self {
            Error::SourceUnavailable { .. } => self,
            other => Error::SourceUnavailable {
                shard,
                reason: other.to_string(),
            },
        }
    }
}
