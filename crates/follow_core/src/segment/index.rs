//! In-memory segment index.

use crate::codec::{self, ChecksumKey};
use crate::error::{CoreError, CoreResult};
use crate::id::MessageId;

/// Position of one message inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Message identifier.
    pub id: MessageId,
    /// Byte offset of the record within the segment.
    pub offset: usize,
}

/// Identifier-sorted list of every message in a segment.
///
/// The index is derived data: it is rebuilt by scanning the segment bytes
/// when a segment is opened and is never written to disk. Entries are kept
/// in append order, which is also identifier order and offset order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentIndex {
    entries: Vec<IndexEntry>,
}

impl SegmentIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `data` from offset 0 and indexes every record.
    ///
    /// The scan ends at the first zero identifier or at the end of `data`.
    /// Returns the index and the offset where free space begins.
    ///
    /// # Errors
    ///
    /// Any record that fails to decode, or whose identifier does not sort
    /// strictly after its predecessor, is a corruption error. Nothing is
    /// skipped.
    pub fn rebuild(data: &[u8], key: &ChecksumKey) -> CoreResult<(Self, usize)> {
        let mut index = Self::new();
        let mut offset = 0;

        while offset < data.len() {
            let Some((view, len)) = codec::decode(data, offset, key)? else {
                break;
            };

            if let Some(last) = index.last_id() {
                if view.id <= last {
                    return Err(CoreError::segment_corruption(format!(
                        "record at offset {offset}: message {} does not sort after {last}",
                        view.id
                    )));
                }
            }

            index.entries.push(IndexEntry {
                id: view.id,
                offset,
            });
            offset += len;
        }

        Ok((index, offset))
    }

    /// Appends an entry for a freshly written record.
    ///
    /// The caller guarantees that `id` sorts after every indexed id.
    pub fn push(&mut self, id: MessageId, offset: usize) {
        debug_assert!(self.last_id().map_or(true, |last| id > last));
        self.entries.push(IndexEntry { id, offset });
    }

    /// Returns the entry with the smallest identifier strictly greater
    /// than `id`, or `None` if there is none.
    #[must_use]
    pub fn successor(&self, id: &MessageId) -> Option<&IndexEntry> {
        let position = match self.entries.binary_search_by(|entry| entry.id.cmp(id)) {
            Ok(found) => found + 1,
            Err(insertion_point) => insertion_point,
        };
        self.entries.get(position)
    }

    /// Returns `true` if a message with this identifier is indexed.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries
            .binary_search_by(|entry| entry.id.cmp(id))
            .is_ok()
    }

    /// Returns the smallest indexed identifier.
    #[must_use]
    pub fn first_id(&self) -> Option<MessageId> {
        self.entries.first().map(|entry| entry.id)
    }

    /// Returns the largest indexed identifier.
    #[must_use]
    pub fn last_id(&self) -> Option<MessageId> {
        self.entries.last().map(|entry| entry.id)
    }

    /// Returns the number of indexed messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no messages are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, DEFAULT_CHECKSUM_KEY};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn id(n: u16) -> MessageId {
        let mut bytes = [0u8; 16];
        bytes[0] = 1;
        bytes[14..].copy_from_slice(&n.to_be_bytes());
        MessageId::from_bytes(bytes)
    }

    fn segment_bytes(ids: &[MessageId], free: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            data.extend(encode(*id, "t", &[i as u8], &DEFAULT_CHECKSUM_KEY).unwrap());
        }
        data.resize(data.len() + free, 0);
        data
    }

    #[test]
    fn rebuild_stops_at_free_space() {
        let data = segment_bytes(&[id(1), id(2), id(3)], 100);
        let (index, free) = SegmentIndex::rebuild(&data, &DEFAULT_CHECKSUM_KEY).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(free, data.len() - 100);
        assert_eq!(index.first_id(), Some(id(1)));
        assert_eq!(index.last_id(), Some(id(3)));
    }

    #[test]
    fn rebuild_stops_at_end_of_data() {
        let data = segment_bytes(&[id(1), id(2)], 0);
        let (index, free) = SegmentIndex::rebuild(&data, &DEFAULT_CHECKSUM_KEY).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(free, data.len());
    }

    #[test]
    fn rebuild_empty() {
        let (index, free) = SegmentIndex::rebuild(&[0u8; 64], &DEFAULT_CHECKSUM_KEY).unwrap();
        assert!(index.is_empty());
        assert_eq!(free, 0);

        let (index, free) = SegmentIndex::rebuild(&[], &DEFAULT_CHECKSUM_KEY).unwrap();
        assert!(index.is_empty());
        assert_eq!(free, 0);
    }

    #[test]
    fn rebuild_tolerates_short_zero_tail() {
        let data = segment_bytes(&[id(1)], 7);
        let (index, free) = SegmentIndex::rebuild(&data, &DEFAULT_CHECKSUM_KEY).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(free, data.len() - 7);
    }

    #[test]
    fn rebuild_rejects_out_of_order_ids() {
        let data = segment_bytes(&[id(2), id(1)], 10);
        let err = SegmentIndex::rebuild(&data, &DEFAULT_CHECKSUM_KEY).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn rebuild_rejects_corrupt_record() {
        let mut data = segment_bytes(&[id(1), id(2)], 10);
        let second = encode(id(1), "t", &[0], &DEFAULT_CHECKSUM_KEY).unwrap().len();
        data[second + 17] ^= 0x40;

        let err = SegmentIndex::rebuild(&data, &DEFAULT_CHECKSUM_KEY).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn successor_and_contains() {
        let mut index = SegmentIndex::new();
        index.push(id(10), 0);
        index.push(id(20), 40);
        index.push(id(30), 80);

        assert_eq!(index.successor(&MessageId::ZERO).unwrap().id, id(10));
        assert_eq!(index.successor(&id(10)).unwrap().id, id(20));
        assert_eq!(index.successor(&id(15)).unwrap().offset, 40);
        assert!(index.successor(&id(30)).is_none());
        assert!(index.successor(&id(31)).is_none());

        assert!(index.contains(&id(20)));
        assert!(!index.contains(&id(21)));
    }

    proptest! {
        #[test]
        fn successor_matches_reference(
            stored in prop::collection::btree_set(1u16..2000, 0..64),
            probe in 0u16..2100,
        ) {
            let ids: Vec<MessageId> = stored.iter().map(|&n| id(n)).collect();
            let data = segment_bytes(&ids, 16);
            let (index, _) = SegmentIndex::rebuild(&data, &DEFAULT_CHECKSUM_KEY).unwrap();

            let reference: BTreeSet<MessageId> = ids.iter().copied().collect();
            let expected = reference
                .range((std::ops::Bound::Excluded(id(probe)), std::ops::Bound::Unbounded))
                .next()
                .copied();

            prop_assert_eq!(index.successor(&id(probe)).map(|e| e.id), expected);

            let entries: Vec<_> = index.iter().collect();
            for pair in entries.windows(2) {
                prop_assert!(pair[0].id < pair[1].id);
                prop_assert!(pair[0].offset < pair[1].offset);
            }
        }
    }
}
