//! Sealed, read-only segments.

use crate::codec::{ChecksumKey, Message, DEFAULT_CHECKSUM_KEY};
use crate::error::{CoreError, CoreResult};
use crate::id::MessageId;
use crate::segment::index::SegmentIndex;
use crate::segment::read_successor;
use follow_storage::{FileSnapshot, MappedRegion, ReadOnlyMap, StorageError};
use std::path::Path;
use tracing::{debug, warn};

/// An immutable segment produced by sealing an active one.
///
/// Archived files hold records only: sealing truncates the file to the
/// bytes actually written, so the index rebuild runs to end of file.
/// There is no append operation; the file is never flushed, grown or
/// re-mapped.
///
/// [`ArchivedSegment::snapshot`] opens the same read-only view over a copy
/// of a file, for segments that a queue in another process may still be
/// writing.
#[derive(Debug)]
pub struct ArchivedSegment {
    map: Box<dyn MappedRegion>,
    index: SegmentIndex,
    used: usize,
    key: ChecksumKey,
}

impl ArchivedSegment {
    /// Opens a sealed segment with the default checksum key.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_key(path, DEFAULT_CHECKSUM_KEY)
    }

    /// Opens a sealed segment and rebuilds its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be mapped or any record is
    /// corrupt.
    pub fn open_with_key(path: &Path, key: ChecksumKey) -> CoreResult<Self> {
        let segment = Self::from_region(Box::new(ReadOnlyMap::open(path)?), key)?;

        let used = segment.used;
        if used < segment.size() {
            warn!(
                path = %path.display(),
                used,
                size = segment.size(),
                "archived segment has untrimmed free space"
            );
        }
        debug!(
            path = %path.display(),
            messages = segment.message_count(),
            "opened archived segment"
        );

        Ok(segment)
    }

    /// Reads a copy of a segment file that may still be written to.
    ///
    /// Works on active and sealed files alike. Free space at the end of the
    /// file is expected and not reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any record is corrupt,
    /// including a record the writer had not finished when the copy was
    /// taken.
    pub fn snapshot(path: &Path, key: ChecksumKey) -> CoreResult<Self> {
        Self::from_region(Box::new(FileSnapshot::read(path)?), key)
    }

    fn from_region(map: Box<dyn MappedRegion>, key: ChecksumKey) -> CoreResult<Self> {
        let (index, used) =
            SegmentIndex::rebuild(map.as_bytes(), &key).map_err(|e| e.in_segment(map.path()))?;
        Ok(Self {
            map,
            index,
            used,
            key,
        })
    }

    /// Returns the message with the smallest identifier greater than `id`.
    ///
    /// `Ok(None)` means there are no more messages in this segment.
    pub fn get_message_after_id(&self, id: &MessageId) -> CoreResult<Option<Message>> {
        read_successor(&self.index, self.map.as_bytes(), id, &self.key)
            .map_err(|e| e.in_segment(self.map.path()))
    }

    /// Returns `true` if this segment holds a message with `id`.
    #[must_use]
    pub fn contains_id(&self, id: &MessageId) -> bool {
        self.index.contains(id)
    }

    /// Returns the first stored identifier.
    #[must_use]
    pub fn first_id(&self) -> Option<MessageId> {
        self.index.first_id()
    }

    /// Returns the last stored identifier.
    #[must_use]
    pub fn last_id(&self) -> Option<MessageId> {
        self.index.last_id()
    }

    /// Returns the number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.index.len()
    }

    /// Returns the segment index.
    #[must_use]
    pub fn index(&self) -> &SegmentIndex {
        &self.index
    }

    /// Returns the number of bytes holding records.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.map.path()
    }

    /// Unmaps and closes the segment.
    pub fn close(self) -> CoreResult<()> {
        drop(self);
        Ok(())
    }

    /// Unmaps the segment and deletes its file.
    pub fn remove(self) -> CoreResult<()> {
        let path = self.map.path().to_path_buf();
        drop(self);
        std::fs::remove_file(&path)
            .map_err(|e| CoreError::from(StorageError::file("remove", path, e)))
    }
}
