//! Filesystem errors carrying the operation and the offending path.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors produced by filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// IO failures while interacting with the filesystem.
    #[error("{operation} failed for '{}': {source}", path.display())]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("Failed to walk '{}': {source}", path.display())]
    Walk {
        /// Root of the traversal.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Zip archive failures.
    #[error("{operation} failed for archive '{}': {source}", path.display())]
    Zip {
        /// Operation that triggered the archive failure.
        operation: &'static str,
        /// Archive path.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// The destination exists and the policy is `Error`.
    #[error("File already exists at '{}'", path.display())]
    DuplicateFile {
        /// The conflicting destination path.
        path: PathBuf,
    },
    /// An archive entry escapes the extraction root.
    #[error("Archive '{}' contains an invalid entry '{entry}'", archive.display())]
    InvalidArchiveEntry {
        /// Archive path.
        archive: PathBuf,
        /// Offending entry name.
        entry: String,
    },
    /// The source path does not exist.
    #[error("Path does not exist: '{}'", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },
    /// The operation observed a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,
}

impl FsError {
    /// Builds an IO error with context.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(operation: &'static str, path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walk(path: impl Into<PathBuf>, source: walkdir::Error) -> Self {
        Self::Walk {
            path: path.into(),
            source,
        }
    }
}
