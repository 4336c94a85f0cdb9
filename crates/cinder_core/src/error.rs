//! # Core Error Types
//!
//! Errors raised by pool and arena allocation.

use thiserror::Error;

/// Errors that can occur while sizing particle storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Record stride is zero or not a multiple of the record alignment.
    #[error("invalid record stride {stride}: must be a non-zero multiple of {alignment}")]
    InvalidStride {
        /// The rejected stride.
        stride: usize,
        /// Required alignment.
        alignment: usize,
    },

    /// The requested capacity does not fit the index table or address space.
    #[error("capacity overflow: requested {requested} records")]
    CapacityOverflow {
        /// Requested record count.
        requested: usize,
    },

    /// The allocator refused to grow the backing storage.
    #[error("allocation failed: could not reserve {bytes} bytes")]
    AllocationFailed {
        /// Bytes that were requested.
        bytes: usize,
    },

    /// A byte range lies outside the buffer.
    #[error("range {offset}..{end} out of bounds for buffer of {len} bytes")]
    OutOfBounds {
        /// Start of the range.
        offset: usize,
        /// End of the range.
        end: usize,
        /// Buffer length.
        len: usize,
    },
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
