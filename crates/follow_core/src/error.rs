//! Error types for follow core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in follow core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage region error.
    #[error("storage error: {0}")]
    Storage(#[from] follow_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message was rejected before anything was written.
    #[error("invalid message: {message}")]
    InvalidMessage {
        /// Why the message was rejected.
        message: String,
    },

    /// A message does not fit even into an empty segment.
    #[error("message needs {needed} bytes, but segments hold at most {capacity}")]
    MessageTooLarge {
        /// Encoded size of the message.
        needed: u64,
        /// Configured segment capacity.
        capacity: u64,
    },

    /// Segment bytes are malformed.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Stored checksum does not match the record bytes.
    #[error("checksum mismatch at offset {offset}: stored {expected:016x}, computed {actual:016x}")]
    ChecksumMismatch {
        /// Offset of the record within its segment.
        offset: usize,
        /// Checksum stored in the record.
        expected: u64,
        /// Checksum computed over the record bytes.
        actual: u64,
    },

    /// A failure tied to a specific segment file.
    #[error("segment {}: {source}", path.display())]
    Segment {
        /// The segment file.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Queue configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The operation cannot run in the queue's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },

    /// Another process holds the queue directory lock.
    #[error("queue locked: another process has exclusive access")]
    QueueLocked,

    /// The queue has been closed.
    #[error("queue is closed")]
    QueueClosed,

    /// Several independent failures, e.g. while closing every segment.
    #[error("{}", join_messages(.0))]
    Multiple(Vec<CoreError>),
}

fn join_messages(errors: &[CoreError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoreError {
    /// Creates an invalid message error.
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Attaches the segment file this error happened in.
    ///
    /// Errors that already name a file are returned unchanged.
    #[must_use]
    pub fn in_segment(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Segment { .. } | Self::Storage(_) | Self::Multiple(_) => self,
            other => Self::Segment {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` if this error reports damaged segment bytes.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::SegmentCorruption { .. } | Self::ChecksumMismatch { .. } => true,
            Self::Segment { source, .. } => source.is_corruption(),
            Self::Multiple(errors) => errors.iter().any(Self::is_corruption),
            _ => false,
        }
    }

    /// Folds a list of failures into a single result.
    pub fn join(mut errors: Vec<Self>) -> CoreResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}
