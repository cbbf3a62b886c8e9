//! Error types for the environment store and its filesystem adapter
//!
//! Two layers report errors:
//!
//! - [`VarError`] comes from the store itself ([`VarTable`](super::VarTable)).
//!   Every mutating variant is raised *before* the blob is touched, so a
//!   failed call leaves blob and table exactly as they were.
//! - [`VfsError`] comes from the adapter ([`VarFs`](super::VarFs)), which adds
//!   the name-based semantics (`ENOENT`, `EEXIST`, `EROFS`, ...) that the store
//!   does not know about.
//!
//! Both map onto POSIX errno values through `errno()`, which is what the FUSE
//! layer and the CLI report to the user.

use std::path::PathBuf;

use thiserror::Error;

use super::table::VarId;
use crate::disk::DiskError;

/// Result type for store operations
pub type VarResult<T> = Result<T, VarError>;

/// Result type for adapter operations
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors raised by the environment store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
    /// The operation would move the end of data past `capacity - 1`
    ///
    /// One byte is always reserved for the end-of-table sentinel.
    #[error("no space left in environment: {requested} bytes requested, {available} available")]
    OutOfSpace {
        /// Bytes the operation needed
        requested: usize,
        /// Bytes that could still be claimed
        available: usize,
    },

    /// The handle refers to a variable that has been removed
    #[error("variable handle {0} is stale")]
    StaleHandle(VarId),

    /// A read or write range falls outside the variable's value
    #[error("access of {len} bytes at offset {pos} is outside a value of {size} bytes")]
    OutOfBounds {
        /// Requested start offset within the value
        pos: usize,
        /// Requested length
        len: usize,
        /// Current value length
        size: usize,
    },

    /// The name cannot be stored in the `KEY=VALUE\0` format
    #[error("invalid variable name {name:?}: {reason}")]
    InvalidName {
        /// Lossy rendering of the offending name
        name: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// The value contains a NUL byte, which would terminate the record early
    #[error("value contains a NUL byte at offset {offset}")]
    InvalidValue {
        /// Offset of the first NUL within the supplied bytes
        offset: usize,
    },

    /// No end marker was found inside the blob
    #[error("environment of {capacity} bytes has no end marker")]
    Unterminated {
        /// Size of the blob that was scanned
        capacity: usize,
    },
}

impl VarError {
    /// POSIX errno equivalent
    pub fn errno(&self) -> libc::c_int {
        match self {
            VarError::OutOfSpace { .. } => libc::ENOSPC,
            VarError::StaleHandle(_) => libc::ESTALE,
            VarError::OutOfBounds { .. } => libc::EINVAL,
            VarError::InvalidName { .. } => libc::EINVAL,
            VarError::InvalidValue { .. } => libc::EINVAL,
            VarError::Unterminated { .. } => libc::EINVAL,
        }
    }
}

/// Errors raised by the filesystem adapter
#[derive(Debug, Error)]
pub enum VfsError {
    /// No variable with that name
    #[error("no such variable: {0}")]
    NotFound(String),

    /// A variable with that name already exists
    #[error("variable already exists: {0}")]
    Exists(String),

    /// The inode is not the root directory
    #[error("inode {0} is not a directory")]
    NotADirectory(u64),

    /// The inode is the root directory
    #[error("inode {0} is a directory")]
    IsADirectory(u64),

    /// No inode with that number
    #[error("no such inode: {0}")]
    NoSuchInode(u64),

    /// Mutation attempted on a read-only mount
    #[error("filesystem is mounted read-only")]
    ReadOnly,

    /// Malformed request from the VFS side
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Error from the environment store
    #[error(transparent)]
    Var(#[from] VarError),

    /// Error from the backing store
    #[error(transparent)]
    Disk(#[from] DiskError),

    /// Mountpoint setup failed
    #[error("cannot mount at {path:?}: {source}")]
    Mount {
        /// Requested mountpoint
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl VfsError {
    /// POSIX errno equivalent
    pub fn errno(&self) -> libc::c_int {
        match self {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::Exists(_) => libc::EEXIST,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::IsADirectory(_) => libc::EISDIR,
            VfsError::NoSuchInode(_) => libc::ENOENT,
            VfsError::ReadOnly => libc::EROFS,
            VfsError::InvalidArgument(_) => libc::EINVAL,
            VfsError::Var(e) => e.errno(),
            VfsError::Disk(_) => libc::EIO,
            VfsError::Mount { .. } => libc::EIO,
        }
    }
}
