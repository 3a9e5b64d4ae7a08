//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A file or mapping operation failed on a specific path.
    #[error("could not {op} {}: {source}", path.display())]
    File {
        /// The operation that failed (e.g. "open", "mmap", "flush").
        op: &'static str,
        /// The file the operation was applied to.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An existing file is larger than the capacity it was opened with.
    #[error(
        "segment file {} has length {actual}, which is larger than requested capacity {requested}",
        path.display()
    )]
    CapacityExceeded {
        /// The file that was opened.
        path: PathBuf,
        /// The file's current length.
        actual: u64,
        /// The capacity requested by the caller.
        requested: u64,
    },

    /// Attempted to write beyond the end of a mapping.
    #[error("write beyond end of mapping: offset {offset}, len {len}, size {size}")]
    WritePastEnd {
        /// The requested write offset.
        offset: usize,
        /// The requested write length.
        len: usize,
        /// The size of the mapping.
        size: usize,
    },

    /// Several independent operations failed (e.g. flush and close).
    #[error("{}", join_messages(.0))]
    Multiple(Vec<StorageError>),
}

fn join_messages(errors: &[StorageError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl StorageError {
    /// Creates a [`StorageError::File`] for `op` on `path`.
    pub fn file(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            op,
            path: path.into(),
            source,
        }
    }

    /// Folds a list of failures into a single result.
    ///
    /// No failures is `Ok(())`, one failure is returned as-is and more than
    /// one becomes [`StorageError::Multiple`].
    pub fn join(mut errors: Vec<Self>) -> StorageResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}
