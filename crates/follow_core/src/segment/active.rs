//! The writable segment at the head of a queue.

use crate::codec::{self, ChecksumKey, Message, DEFAULT_CHECKSUM_KEY};
use crate::error::{CoreError, CoreResult};
use crate::id::MessageId;
use crate::segment::archived::ArchivedSegment;
use crate::segment::index::SegmentIndex;
use crate::segment::read_successor;
use follow_storage::{MappedRegion, StorageError, WritableMap};
use std::path::Path;
use tracing::debug;

/// Result of [`ActiveSegment::store_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StoreOutcome {
    /// The message was written and flushed.
    Stored {
        /// Offset of the record within the segment.
        offset: usize,
        /// Encoded size of the record.
        len: usize,
    },
    /// The segment cannot hold the message; nothing was written.
    ///
    /// This is the signal to rotate to a fresh segment.
    NotEnoughSpace {
        /// Encoded size of the message.
        needed: usize,
        /// Bytes left before the capacity limit.
        available: usize,
    },
}

/// A fixed-capacity, memory-mapped, append-only segment.
///
/// The backing file is pre-allocated to its capacity with zeros. Records
/// are written at a monotonically advancing cursor and flushed before the
/// append returns. On open the in-memory index is rebuilt by scanning
/// records from offset 0 until the first zero identifier.
#[derive(Debug)]
pub struct ActiveSegment {
    map: WritableMap,
    index: SegmentIndex,
    next_free: usize,
    key: ChecksumKey,
}

impl ActiveSegment {
    /// Opens or creates an active segment with the default checksum key.
    ///
    /// See [`ActiveSegment::open_with_key`].
    pub fn open(path: &Path, capacity: u64) -> CoreResult<Self> {
        Self::open_with_key(path, capacity, DEFAULT_CHECKSUM_KEY)
    }

    /// Opens or creates an active segment of `capacity` bytes.
    ///
    /// A smaller existing file is extended with zeros.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened, resized or mapped
    /// - The existing file is larger than `capacity` (`InvalidConfig`)
    /// - A record before the first zero identifier is corrupt
    pub fn open_with_key(path: &Path, capacity: u64, key: ChecksumKey) -> CoreResult<Self> {
        let map = WritableMap::open(path, capacity).map_err(|e| match e {
            e @ StorageError::CapacityExceeded { .. } => CoreError::invalid_config(e.to_string()),
            e => CoreError::from(e),
        })?;

        let (index, next_free) =
            SegmentIndex::rebuild(map.as_bytes(), &key).map_err(|e| e.in_segment(path))?;

        debug!(
            path = %path.display(),
            messages = index.len(),
            used = next_free,
            capacity,
            "opened active segment"
        );

        Ok(Self {
            map,
            index,
            next_free,
            key,
        })
    }

    /// Appends a message.
    ///
    /// Returns [`StoreOutcome::NotEnoughSpace`] without touching the segment
    /// when the encoded message does not fit in the remaining space.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` if the type tag or body exceed the format
    /// limits, or if `id` is zero or does not sort after the last stored id.
    /// Returns a storage error if the write or flush fails.
    pub fn store_message(
        &mut self,
        id: MessageId,
        kind: &str,
        body: &[u8],
    ) -> CoreResult<StoreOutcome> {
        codec::validate(kind, body)?;
        if id.is_zero() {
            return Err(CoreError::invalid_message(
                "the all-zero message id is reserved",
            ));
        }

        if let Some(last) = self.index.last_id() {
            if id <= last {
                return Err(CoreError::invalid_message(format!(
                    "message {id} does not sort after the last stored message {last}"
                )));
            }
        }

        let needed = codec::encoded_len(kind.len(), body.len());
        let available = self.remaining();
        if needed > available {
            return Ok(StoreOutcome::NotEnoughSpace { needed, available });
        }

        let record = codec::encode(id, kind, body, &self.key)?;
        let offset = self.next_free;

        self.map.write_at(offset, &record)?;
        self.index.push(id, offset);
        self.next_free += record.len();

        self.map.flush_range(offset, record.len())?;

        Ok(StoreOutcome::Stored {
            offset,
            len: record.len(),
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

    /// Returns the fixed capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    /// Returns the number of bytes holding records.
    #[must_use]
    pub fn used(&self) -> usize {
        self.next_free
    }

    /// Returns the number of free bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.next_free
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.map.path()
    }

    /// Flushes, unmaps and closes the segment.
    pub fn close(self) -> CoreResult<()> {
        self.map.close()?;
        Ok(())
    }

    /// Seals this segment and reopens it read-only.
    ///
    /// The file is truncated to the bytes actually written, so the archived
    /// file holds records only. Its record bytes do not change.
    pub fn seal(self) -> CoreResult<ArchivedSegment> {
        let Self {
            map,
            next_free,
            key,
            ..
        } = self;

        let path = map.seal(next_free as u64)?;
        ArchivedSegment::open_with_key(&path, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn first_id() -> MessageId {
        "00010203-0405-0607-0809-0a0b0c0d0e0f".parse().unwrap()
    }

    fn second_id() -> MessageId {
        "00010203-0405-0607-0809-0a0b0c0d0f0f".parse().unwrap()
    }

    fn before_both() -> MessageId {
        "00010203-0405-0607-0809-0a0b0c0d0e0e".parse().unwrap()
    }

    fn assert_two_messages(segment: &ActiveSegment) {
        let first = segment.get_message_after_id(&before_both()).unwrap().unwrap();
        assert_eq!(first.id, first_id());
        assert_eq!(first.kind, "test");
        assert_eq!(first.body, vec![1, 2, 3]);

        let second = segment.get_message_after_id(&first_id()).unwrap().unwrap();
        assert_eq!(second.id, second_id());
        assert_eq!(second.kind, "test2");
        assert_eq!(second.body, vec![4, 5, 6]);

        assert!(segment.get_message_after_id(&second_id()).unwrap().is_none());
    }

    #[test]
    fn store_lookup_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");

        let mut segment = ActiveSegment::open(&path, 128).unwrap();
        assert!(matches!(
            segment.store_message(first_id(), "test", &[1, 2, 3]).unwrap(),
            StoreOutcome::Stored { offset: 0, len: 36 }
        ));
        assert!(matches!(
            segment.store_message(second_id(), "test2", &[4, 5, 6]).unwrap(),
            StoreOutcome::Stored { offset: 36, .. }
        ));
        assert_two_messages(&segment);
        segment.close().unwrap();

        let segment = ActiveSegment::open(&path, 128).unwrap();
        assert_eq!(segment.message_count(), 2);
        assert_eq!(segment.used(), 36 + 37);
        assert_two_messages(&segment);
    }

    #[test]
    fn reopen_reproduces_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");

        let mut segment = ActiveSegment::open(&path, 1024).unwrap();
        let mut id = first_id();
        for i in 0..10u8 {
            let _ = segment.store_message(id, "k", &[i; 10]).unwrap();
            id = id.successor().unwrap();
        }
        let before = segment.index().clone();
        segment.close().unwrap();

        let reopened = ActiveSegment::open(&path, 1024).unwrap();
        assert_eq!(reopened.index(), &before);
    }

    #[test]
    fn not_enough_space_leaves_segment_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");

        let mut segment = ActiveSegment::open(&path, 100).unwrap();
        let _ = segment.store_message(first_id(), "test", &[1, 2, 3]).unwrap();
        let used = segment.used();
        let bytes = std::fs::read(&path).unwrap();

        let outcome = segment.store_message(second_id(), "test2", &[0; 40]).unwrap();
        assert_eq!(
            outcome,
            StoreOutcome::NotEnoughSpace {
                needed: 29 + 5 + 40,
                available: 100 - used
            }
        );
        assert_eq!(segment.used(), used);
        assert_eq!(segment.message_count(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);

        // A message that fits still goes in.
        assert!(matches!(
            segment.store_message(second_id(), "t", &[]).unwrap(),
            StoreOutcome::Stored { .. }
        ));
        assert_eq!(segment.message_count(), 2);
    }

    #[test]
    fn exact_fit_fills_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");

        let mut segment = ActiveSegment::open(&path, 36).unwrap();
        assert!(matches!(
            segment.store_message(first_id(), "test", &[1, 2, 3]).unwrap(),
            StoreOutcome::Stored { .. }
        ));
        assert_eq!(segment.remaining(), 0);
        segment.close().unwrap();

        let segment = ActiveSegment::open(&path, 36).unwrap();
        assert_eq!(segment.message_count(), 1);
    }

    #[test]
    fn rejects_invalid_messages() {
        let dir = tempdir().unwrap();
        let mut segment = ActiveSegment::open(&dir.path().join("active"), 1024).unwrap();

        let long_type = "t".repeat(256);
        let err = segment.store_message(first_id(), &long_type, &[]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMessage { .. }));

        let err = segment.store_message(MessageId::ZERO, "t", &[]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMessage { .. }));

        let _ = segment.store_message(second_id(), "t", &[]).unwrap();
        let err = segment.store_message(first_id(), "t", &[]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMessage { .. }));
        let err = segment.store_message(second_id(), "t", &[]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMessage { .. }));

        assert_eq!(segment.message_count(), 1);
    }

    #[test]
    fn refuses_to_shrink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");
        ActiveSegment::open(&path, 256).unwrap().close().unwrap();

        let err = ActiveSegment::open(&path, 128).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));

        // Growing is fine and keeps the data.
        let segment = ActiveSegment::open(&path, 512).unwrap();
        assert_eq!(segment.capacity(), 512);
    }

    #[test]
    fn corrupt_record_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");

        let mut segment = ActiveSegment::open(&path, 128).unwrap();
        let _ = segment.store_message(first_id(), "test", &[1, 2, 3]).unwrap();
        segment.close().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[20] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let err = ActiveSegment::open(&path, 128).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("active"));
    }

    #[test]
    fn garbage_in_free_space_is_not_a_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");

        let mut segment = ActiveSegment::open(&path, 128).unwrap();
        let _ = segment.store_message(first_id(), "test", &[1, 2, 3]).unwrap();
        segment.close().unwrap();

        // Leave the 16 bytes after the record zero so the scan stops there.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[36 + 20] = 0xaa;
        bytes[127] = 0x55;
        std::fs::write(&path, &bytes).unwrap();

        let segment = ActiveSegment::open(&path, 128).unwrap();
        assert_eq!(segment.message_count(), 1);
        assert!(segment.get_message_after_id(&first_id()).unwrap().is_none());
    }

    #[test]
    fn contains_and_bounds() {
        let dir = tempdir().unwrap();
        let mut segment = ActiveSegment::open(&dir.path().join("active"), 128).unwrap();
        assert!(segment.first_id().is_none());

        let _ = segment.store_message(first_id(), "test", &[1]).unwrap();
        let _ = segment.store_message(second_id(), "test", &[2]).unwrap();

        assert!(segment.contains_id(&first_id()));
        assert!(!segment.contains_id(&before_both()));
        assert_eq!(segment.first_id(), Some(first_id()));
        assert_eq!(segment.last_id(), Some(second_id()));
    }

    #[test]
    fn seal_keeps_messages_and_trims_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("active");

        let mut segment = ActiveSegment::open(&path, 128).unwrap();
        let _ = segment.store_message(first_id(), "test", &[1, 2, 3]).unwrap();
        let _ = segment.store_message(second_id(), "test2", &[4, 5, 6]).unwrap();

        let archived = segment.seal().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 73);
        assert_eq!(archived.message_count(), 2);

        let first = archived.get_message_after_id(&before_both()).unwrap().unwrap();
        assert_eq!(first.id, first_id());
        let second = archived.get_message_after_id(&first_id()).unwrap().unwrap();
        assert_eq!(second.body, vec![4, 5, 6]);
        assert!(archived.get_message_after_id(&second_id()).unwrap().is_none());
    }
}
