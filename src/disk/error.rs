//! Backing store error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for backing store operations
pub type DiskResult<T> = Result<T, DiskError>;

/// Errors that can occur while loading or storing an environment image
#[derive(Debug, Error)]
pub enum DiskError {
    /// I/O error reading or writing the image file
    ///
    /// # Common Causes
    /// - Permission denied on a device node
    /// - Device removed while mounted
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The image cannot hold an environment
    ///
    /// # Common Causes
    /// - File not found
    /// - Empty file
    /// - Region size of zero
    #[error("invalid environment image {path:?}: {reason}")]
    InvalidFormat {
        /// Image path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// The requested region lies outside the image
    #[error("region ending at {requested} is out of bounds (image size: {size})")]
    OutOfBounds {
        /// End offset of the requested region
        requested: u64,
        /// Image size
        size: u64,
    },

    /// A store call passed a buffer that does not match the region size
    ///
    /// The environment never changes size while mounted, so this indicates a
    /// caller mixing up stores.
    #[error("buffer of {actual} bytes does not match region of {expected} bytes")]
    SizeMismatch {
        /// Region size
        expected: u64,
        /// Buffer size
        actual: u64,
    },

    /// Write attempted on a store opened read-only
    #[error("environment image {path:?} is read-only")]
    ReadOnly {
        /// Image path
        path: PathBuf,
    },
}
