//! Read-only access to a queue owned by another process.
//!
//! [`Queue`](crate::Queue) holds the directory lock for as long as it is
//! open, so tools that only read (tailing, inspection, verification) go
//! through [`QueueReader`] instead. A reader never takes the lock, never
//! creates, extends or deletes files, and sees the queue as it was at the
//! last [`QueueReader::refresh`].

use crate::codec::{ChecksumKey, Message, DEFAULT_CHECKSUM_KEY};
use crate::dir::{list_segments, segment_file_name};
use crate::error::{CoreError, CoreResult};
use crate::id::MessageId;
use crate::queue::{SegmentInfo, SegmentRole};
use crate::segment::{check_ordering, ArchivedSegment, Segment};
use follow_storage::StorageError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A point-in-time, read-only view of a queue directory.
///
/// Sealed segments are memory-mapped. The newest segment may still be
/// written, so it is copied into memory instead; if the copy catches the
/// writer in the middle of an append, [`QueueReader::refresh`] reports
/// corruption and keeps the previous view, and a later refresh succeeds.
#[derive(Debug)]
pub struct QueueReader {
    path: PathBuf,
    key: ChecksumKey,
    /// Oldest first.
    segments: Vec<(u64, Segment)>,
}

impl QueueReader {
    /// Opens a queue directory for reading with the default checksum key.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_key(path, DEFAULT_CHECKSUM_KEY)
    }

    /// Opens a queue directory for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or any segment is
    /// corrupt.
    pub fn open_with_key(path: &Path, key: ChecksumKey) -> CoreResult<Self> {
        let mut reader = Self {
            path: path.to_path_buf(),
            key,
            segments: Vec::new(),
        };
        reader.refresh()?;
        Ok(reader)
    }

    /// Re-reads the directory, picking up new messages, new segments and
    /// evictions.
    ///
    /// On error the previous view is kept.
    pub fn refresh(&mut self) -> CoreResult<()> {
        let sequences = list_segments(&self.path)?;
        let newest = sequences.last().copied();

        let mut segments = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let path = self.path.join(segment_file_name(sequence));
            let opened = if Some(sequence) == newest {
                ArchivedSegment::snapshot(&path, self.key)
            } else {
                ArchivedSegment::open_with_key(&path, self.key)
            };
            match opened {
                Ok(segment) => segments.push((sequence, Segment::from(segment))),
                Err(err) if is_missing(&err) && Some(sequence) != newest => {
                    debug!(sequence, "segment evicted while refreshing");
                }
                Err(err) => return Err(err),
            }
        }

        check_ordering(segments.iter().map(|(sequence, segment)| (*sequence, segment)))?;

        self.segments = segments;
        Ok(())
    }

    /// Returns the oldest message in the view whose identifier is greater
    /// than `id`.
    pub fn next_after(&self, id: &MessageId) -> CoreResult<Option<Message>> {
        for (_, segment) in &self.segments {
            match segment.last_id() {
                Some(last) if last > *id => {}
                _ => continue,
            }
            if let Some(message) = segment.get_message_after_id(id)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Describes every segment in the view, oldest first.
    ///
    /// The newest segment is reported as the active one.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInfo> {
        let newest = self.segments.last().map(|(sequence, _)| *sequence);
        self.segments
            .iter()
            .map(|(sequence, segment)| {
                let mut info = SegmentInfo::describe(*sequence, segment);
                if Some(*sequence) == newest {
                    info.role = SegmentRole::Active;
                }
                info
            })
            .collect()
    }

    /// Returns the identifier of the newest message in the view.
    #[must_use]
    pub fn last_id(&self) -> Option<MessageId> {
        self.segments
            .iter()
            .rev()
            .find_map(|(_, segment)| segment.last_id())
    }

    /// Returns the queue directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_missing(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::Storage(StorageError::File { source, .. })
            if source.kind() == io::ErrorKind::NotFound
    )
}
