//! Segment storage for messages.
//!
//! A segment is one file holding a contiguous run of message records in
//! append order. Segments move through a fixed lifecycle:
//!
//! ```text
//! created -> active -> (sealed) -> archived -> (evicted)
//! ```
//!
//! - [`ActiveSegment`] - pre-allocated, memory-mapped read/write, accepts appends
//! - [`ArchivedSegment`] - trimmed to its records, mapped read-only
//!
//! Both keep an in-memory [`SegmentIndex`] of (identifier, offset) pairs
//! that is rebuilt by scanning the file on open. See [`crate::codec`] for
//! the record format.

mod active;
mod archived;
mod index;

pub use active::{ActiveSegment, StoreOutcome};
pub use archived::ArchivedSegment;
pub use index::{IndexEntry, SegmentIndex};

use crate::codec::{self, ChecksumKey, Message};
use crate::error::{CoreError, CoreResult};
use crate::id::MessageId;
use std::path::Path;

/// Either kind of segment, with the lookup operations they share.
#[derive(Debug)]
pub enum Segment {
    /// The writable head segment.
    Active(ActiveSegment),
    /// A sealed, read-only segment.
    Archived(ArchivedSegment),
}

impl Segment {
    /// Returns the message with the smallest identifier greater than `id`.
    ///
    /// `Ok(None)` means there are no more messages in this segment.
    pub fn get_message_after_id(&self, id: &MessageId) -> CoreResult<Option<Message>> {
        match self {
            Self::Active(segment) => segment.get_message_after_id(id),
            Self::Archived(segment) => segment.get_message_after_id(id),
        }
    }

    /// Returns `true` if this segment holds a message with `id`.
    #[must_use]
    pub fn contains_id(&self, id: &MessageId) -> bool {
        self.index().contains(id)
    }

    /// Returns the first stored identifier.
    #[must_use]
    pub fn first_id(&self) -> Option<MessageId> {
        self.index().first_id()
    }

    /// Returns the last stored identifier.
    #[must_use]
    pub fn last_id(&self) -> Option<MessageId> {
        self.index().last_id()
    }

    /// Returns the number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.index().len()
    }

    /// Returns the number of bytes holding records.
    #[must_use]
    pub fn bytes_used(&self) -> usize {
        match self {
            Self::Active(segment) => segment.used(),
            Self::Archived(segment) => segment.used(),
        }
    }

    /// Returns the segment index.
    #[must_use]
    pub fn index(&self) -> &SegmentIndex {
        match self {
            Self::Active(segment) => segment.index(),
            Self::Archived(segment) => segment.index(),
        }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Active(segment) => segment.path(),
            Self::Archived(segment) => segment.path(),
        }
    }

    /// Returns `true` for the active segment.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Closes the segment.
    pub fn close(self) -> CoreResult<()> {
        match self {
            Self::Active(segment) => segment.close(),
            Self::Archived(segment) => segment.close(),
        }
    }
}

impl From<ActiveSegment> for Segment {
    fn from(segment: ActiveSegment) -> Self {
        Self::Active(segment)
    }
}

impl From<ArchivedSegment> for Segment {
    fn from(segment: ArchivedSegment) -> Self {
        Self::Archived(segment)
    }
}

/// Checks that every segment starts after the previous segment ends.
///
/// `segments` must be given oldest first, as (sequence, segment) pairs.
pub(crate) fn check_ordering<'a>(
    segments: impl IntoIterator<Item = (u64, &'a Segment)>,
) -> CoreResult<()> {
    let mut previous: Option<(u64, MessageId)> = None;

    for (sequence, segment) in segments {
        if let (Some((prev_sequence, prev_last)), Some(first)) = (previous, segment.first_id()) {
            if first <= prev_last {
                return Err(CoreError::segment_corruption(format!(
                    "first message {first} does not sort after {prev_last}, \
                     the last message of segment {prev_sequence}"
                ))
                .in_segment(segment.path()));
            }
        }
        if let Some(last) = segment.last_id() {
            previous = Some((sequence, last));
        }
    }
    Ok(())
}

/// Decodes the successor of `id` out of segment bytes.
pub(crate) fn read_successor(
    index: &SegmentIndex,
    data: &[u8],
    id: &MessageId,
    key: &ChecksumKey,
) -> CoreResult<Option<Message>> {
    let Some(entry) = index.successor(id) else {
        return Ok(None);
    };

    match codec::decode(data, entry.offset, key)? {
        Some((view, _)) => Ok(Some(view.to_message())),
        None => Err(CoreError::segment_corruption(format!(
            "indexed message {} at offset {} is missing",
            entry.id, entry.offset
        ))),
    }
}
