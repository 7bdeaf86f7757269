//! Error types for libfat32.

use std::fmt;
use std::io;

/// Result alias used throughout the library.
pub type Result<T> = core::result::Result<T, FsError>;

/// Filesystem operation error codes.
#[derive(Debug)]
pub enum FsError {
    /// Short read, seek failure, or the image could not be opened.
    Io(io::Error),
    /// A BPB/EBPB/FSInfo invariant is violated; the image is not FAT32.
    InvalidImage(&'static str),
    /// A path segment does not resolve.
    NotFound,
    /// Expected a directory but found a file.
    NotADirectory,
    /// Expected a file but found a directory.
    IsADirectory,
    /// A chain traversal hit the bad-cluster sentinel.
    BadCluster(u32),
    /// A refresh failed; the previous state is still usable, retry later.
    Transient,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::Io(err) => write!(f, "i/o error: {err}"),
            FsError::InvalidImage(reason) => write!(f, "invalid FAT32 image: {reason}"),
            FsError::NotFound => write!(f, "path not found"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::IsADirectory => write!(f, "is a directory"),
            FsError::BadCluster(cluster) => write!(f, "bad cluster in chain at {cluster}"),
            FsError::Transient => write!(f, "refresh failed, try again"),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::Io(err)
    }
}
