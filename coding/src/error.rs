use crate::Parameters;
use thiserror::Error;

/// Message raised when a matrix cannot be constructed directly.
pub const ALLOCATION_FAILED: &str = "Not enough free memory to complete";

/// Message raised when a decode cannot obtain its matrix.
pub const LOOKUP_FAILED: &str = "Could not create cauchy matrix";

/// Errors that can occur when constructing matrices or decoding shards.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid code parameters: k={k} m={m} w={w}")]
    InvalidParameters { k: i32, m: i32, w: i32 },
    #[error("matrix construction failed: {0}")]
    AllocationFailed(Parameters),
    #[error("matrix lookup failed: {parameters}")]
    LookupFailed {
        parameters: Parameters,
        #[source]
        source: Box<Error>,
    },
    #[error("decode failed: {0}")]
    DecodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid size: {0}")]
    InvalidSize(i32),
    #[error("missing shard {index} is not erased")]
    MissingShard { index: usize },
    #[error("invalid shard count: expected {expected}, got {actual}")]
    InvalidShardCount { expected: usize, actual: usize },
    #[error("invalid shard size at {index}: expected {expected}, got {actual}")]
    InvalidShardSize {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// How an [Error] surfaces at the host boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Raise an exception carrying the message.
    Raise(String),
    /// Return `false` without raising.
    ReturnFalse,
}

impl Error {
    /// Map the error to its boundary effect.
    ///
    /// Setup failures raise; a failed reconstruction is reported as `false`.
    pub fn signal(&self) -> Signal {
        match self {
            Self::AllocationFailed(_) => Signal::Raise(ALLOCATION_FAILED.to_string()),
            Self::LookupFailed { .. } => Signal::Raise(LOOKUP_FAILED.to_string()),
            Self::DecodeFailed(_) => Signal::ReturnFalse,
            Self::InvalidParameters { .. }
            | Self::InvalidSize(_)
            | Self::MissingShard { .. }
            | Self::InvalidShardCount { .. }
            | Self::InvalidShardSize { .. } => Signal::Raise(self.to_string()),
        }
    }
}
