//! The segmented message queue.
//!
//! A queue is an ordered run of segment files in one directory: zero or more
//! archived segments followed by exactly one active segment. Producers append
//! to the active segment; when it runs out of space it is sealed and a fresh
//! one takes its place. Once the directory holds more segments than allowed,
//! the oldest archived segments are deleted.
//!
//! ```text
//! seg-000004.dat   seg-000005.dat   seg-000006.dat
//! [ archived ] --> [ archived ] --> [  active  ] <-- append
//!     ^ evicted first
//! ```
//!
//! Consumers poll with [`Queue::next_after`], passing the last identifier
//! they have seen ([`MessageId::ZERO`] to start from the oldest retained
//! message).

use crate::codec::{self, Message};
use crate::config::QueueConfig;
use crate::dir::QueueDir;
use crate::error::{CoreError, CoreResult};
use crate::id::{IdGenerator, MessageId};
use crate::segment::{check_ordering, ActiveSegment, ArchivedSegment, Segment, StoreOutcome};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A durable, segmented, append-only message queue.
///
/// # Thread Safety
///
/// `Queue` is `Send + Sync`; share it between producers and consumers with
/// an `Arc`. Appends, rotation, eviction and lookups are serialized by one
/// queue-wide lock.
///
/// # Example
///
/// ```no_run
/// use follow_core::{MessageId, Queue};
///
/// let queue = Queue::open("/tmp/events".as_ref(), 64 * 1024 * 1024, 16)?;
/// let id = queue.append("user.created", b"{\"name\":\"Alice\"}")?;
///
/// let first = queue.next_after(&MessageId::ZERO)?.expect("just appended");
/// assert_eq!(first.id, id);
/// queue.close()?;
/// # Ok::<(), follow_core::CoreError>(())
/// ```
pub struct Queue {
    path: PathBuf,
    config: QueueConfig,
    state: Mutex<Option<QueueState>>,
}

/// Everything that goes away on close.
struct QueueState {
    dir: QueueDir,
    /// Oldest first. Only the last slot may hold the active segment.
    segments: VecDeque<Slot>,
    ids: IdGenerator,
}

struct Slot {
    sequence: u64,
    segment: Segment,
}

/// Role of a segment within its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentRole {
    /// The writable head segment.
    Active,
    /// A sealed, read-only segment.
    Archived,
}

/// A snapshot of one segment, for tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    /// Sequence number from the file name; higher is newer.
    pub sequence: u64,
    /// Path of the segment file.
    pub path: PathBuf,
    /// Whether the segment still accepts appends.
    pub role: SegmentRole,
    /// Number of stored messages.
    pub message_count: usize,
    /// Bytes holding records.
    pub bytes_used: usize,
    /// First stored identifier.
    pub first_id: Option<MessageId>,
    /// Last stored identifier.
    pub last_id: Option<MessageId>,
}

impl SegmentInfo {
    /// Describes `segment`, stored under `sequence`.
    #[must_use]
    pub fn describe(sequence: u64, segment: &Segment) -> Self {
        Self {
            sequence,
            path: segment.path().to_path_buf(),
            role: if segment.is_active() {
                SegmentRole::Active
            } else {
                SegmentRole::Archived
            },
            message_count: segment.message_count(),
            bytes_used: segment.bytes_used(),
            first_id: segment.first_id(),
            last_id: segment.last_id(),
        }
    }
}

impl Queue {
    /// Opens or creates a queue with the given segment capacity and segment
    /// budget, using defaults for everything else.
    pub fn open(path: &Path, segment_size: u64, max_segments: usize) -> CoreResult<Self> {
        Self::open_with_config(
            path,
            QueueConfig::new()
                .segment_size(segment_size)
                .max_segments(max_segments),
        )
    }

    /// Opens or creates a queue.
    ///
    /// Every existing segment but the newest is opened read-only; the newest
    /// becomes the active segment. A new directory starts with an empty
    /// `seg-000001.dat`. Segments beyond `max_segments` are deleted oldest
    /// first before anything is mapped.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The directory is missing (and may not be created) or locked
    /// - Any segment is corrupt, or segments are not in identifier order
    /// - The active segment is larger than `segment_size`
    pub fn open_with_config(path: &Path, config: QueueConfig) -> CoreResult<Self> {
        config.validate()?;

        let dir = QueueDir::open(path, config.create_if_missing)?;
        let mut sequences = dir.list_segments()?;

        // Everything that stays is opened and checked before anything over
        // the budget is deleted, so a rejected open leaves the files alone.
        let excess = sequences.len().saturating_sub(config.max_segments);
        let survivors = sequences.split_off(excess);
        let (newest, archived) = match survivors.split_last() {
            Some((newest, archived)) => (Some(*newest), archived),
            None => (None, &survivors[..]),
        };

        let mut segments = VecDeque::with_capacity(config.max_segments + 1);
        for &sequence in archived {
            let archived =
                ArchivedSegment::open_with_key(&dir.segment_path(sequence), config.checksum_key)?;
            segments.push_back(Slot {
                sequence,
                segment: archived.into(),
            });
        }

        let active_sequence = newest.unwrap_or(1);
        let active = ActiveSegment::open_with_key(
            &dir.segment_path(active_sequence),
            config.segment_size,
            config.checksum_key,
        )?;
        if newest.is_none() {
            dir.sync()?;
        }
        segments.push_back(Slot {
            sequence: active_sequence,
            segment: active.into(),
        });

        check_ordering(segments.iter().map(|slot| (slot.sequence, &slot.segment)))?;

        for sequence in sequences {
            dir.delete_segment(sequence)?;
            info!(sequence, "evicted segment over the configured budget");
        }

        let last = segments
            .iter()
            .rev()
            .find_map(|slot| slot.segment.last_id())
            .unwrap_or(MessageId::ZERO);

        info!(
            path = %path.display(),
            segments = segments.len(),
            last_id = %last,
            "opened queue"
        );

        Ok(Self {
            path: path.to_path_buf(),
            config,
            state: Mutex::new(Some(QueueState {
                dir,
                segments,
                ids: IdGenerator::starting_after(last),
            })),
        })
    }

    /// Appends a message and returns its identifier.
    ///
    /// The record is flushed to the file before this returns. When the
    /// active segment is full it is sealed, a new one is created, and the
    /// oldest segments are evicted if the budget is exceeded.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The type tag or body exceed the format limits (`InvalidMessage`)
    /// - The message cannot fit even an empty segment (`MessageTooLarge`)
    /// - The queue is closed (`QueueClosed`)
    /// - Writing, sealing or evicting fails
    ///
    /// Rejected messages leave the queue untouched.
    pub fn append(&self, kind: &str, body: &[u8]) -> CoreResult<MessageId> {
        codec::validate(kind, body)?;
        let needed = codec::encoded_len(kind.len(), body.len()) as u64;
        if needed > self.config.segment_size {
            return Err(CoreError::MessageTooLarge {
                needed,
                capacity: self.config.segment_size,
            });
        }

        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(CoreError::QueueClosed)?;
        let id = state.ids.next_id()?;

        match state.active(&self.config)?.store_message(id, kind, body)? {
            StoreOutcome::Stored { .. } => return Ok(id),
            StoreOutcome::NotEnoughSpace { needed, available } => {
                debug!(needed, available, "active segment full");
            }
        }

        state.rotate(&self.config)?;

        match state.active(&self.config)?.store_message(id, kind, body)? {
            StoreOutcome::Stored { .. } => Ok(id),
            StoreOutcome::NotEnoughSpace { needed, .. } => Err(CoreError::MessageTooLarge {
                needed: needed as u64,
                capacity: self.config.segment_size,
            }),
        }
    }

    /// Returns the oldest retained message whose identifier is greater than
    /// `id`.
    ///
    /// `Ok(None)` means the caller has caught up. Pass
    /// [`MessageId::ZERO`] to read from the oldest retained message.
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` after [`Queue::close`], or a corruption error if
    /// the stored record fails verification.
    pub fn next_after(&self, id: &MessageId) -> CoreResult<Option<Message>> {
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or(CoreError::QueueClosed)?;

        for slot in &state.segments {
            match slot.segment.last_id() {
                Some(last) if last > *id => {}
                _ => continue,
            }
            if let Some(message) = slot.segment.get_message_after_id(id)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Closes every segment and releases the directory lock.
    ///
    /// Every segment is closed even if some fail; the failures are returned
    /// together. Afterwards every operation returns `QueueClosed`. Closing a
    /// closed queue does nothing.
    pub fn close(&self) -> CoreResult<()> {
        let Some(QueueState { dir, segments, .. }) = self.state.lock().take() else {
            return Ok(());
        };

        let mut errors = Vec::new();
        for slot in segments {
            if let Err(err) = slot.segment.close() {
                errors.push(err);
            }
        }
        drop(dir);

        info!(path = %self.path.display(), failures = errors.len(), "closed queue");
        CoreError::join(errors)
    }

    /// Returns a snapshot of every retained segment, oldest first.
    pub fn segments(&self) -> CoreResult<Vec<SegmentInfo>> {
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or(CoreError::QueueClosed)?;
        Ok(state
            .segments
            .iter()
            .map(|slot| SegmentInfo::describe(slot.sequence, &slot.segment))
            .collect())
    }

    /// Returns the number of retained segments, the active one included.
    pub fn segment_count(&self) -> CoreResult<usize> {
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or(CoreError::QueueClosed)?;
        Ok(state.segments.len())
    }

    /// Returns the identifier of the newest stored message.
    pub fn last_id(&self) -> CoreResult<Option<MessageId>> {
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or(CoreError::QueueClosed)?;
        Ok(state
            .segments
            .iter()
            .rev()
            .find_map(|slot| slot.segment.last_id()))
    }

    /// Returns the configuration the queue was opened with.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the queue directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` until [`Queue::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

impl QueueState {
    /// Returns the active segment, creating the next one if the head
    /// segment has been sealed.
    fn active(&mut self, config: &QueueConfig) -> CoreResult<&mut ActiveSegment> {
        let has_active = self
            .segments
            .back()
            .is_some_and(|slot| slot.segment.is_active());

        if !has_active {
            let sequence = self.segments.back().map_or(1, |slot| slot.sequence + 1);
            let path = self.dir.segment_path(sequence);
            let active =
                ActiveSegment::open_with_key(&path, config.segment_size, config.checksum_key)?;
            self.dir.sync()?;
            info!(sequence, path = %path.display(), "created active segment");
            self.segments.push_back(Slot {
                sequence,
                segment: active.into(),
            });
        }

        match self.segments.back_mut() {
            Some(Slot {
                segment: Segment::Active(active),
                ..
            }) => Ok(active),
            _ => Err(CoreError::invalid_operation("queue has no active segment")),
        }
    }

    /// Seals the active segment, opens its successor and evicts segments
    /// over the budget.
    ///
    /// The old file is trimmed and synced before the new one is created.
    fn rotate(&mut self, config: &QueueConfig) -> CoreResult<()> {
        let Some(slot) = self.segments.pop_back() else {
            return Ok(());
        };
        let sequence = slot.sequence;
        let active = match slot.segment {
            Segment::Active(active) => active,
            archived @ Segment::Archived(_) => {
                self.segments.push_back(Slot {
                    sequence,
                    segment: archived,
                });
                return Ok(());
            }
        };

        let path = active.path().to_path_buf();
        let messages = active.message_count();
        let used = active.used();

        let sealed = match active.seal() {
            Ok(sealed) => sealed,
            Err(err) => {
                match ActiveSegment::open_with_key(&path, config.segment_size, config.checksum_key)
                {
                    Ok(restored) => self.segments.push_back(Slot {
                        sequence,
                        segment: restored.into(),
                    }),
                    Err(reopen) => warn!(
                        path = %path.display(),
                        error = %reopen,
                        "could not reopen segment after a failed seal"
                    ),
                }
                return Err(err);
            }
        };

        info!(
            sequence,
            path = %path.display(),
            messages,
            bytes = used,
            "sealed segment"
        );
        self.segments.push_back(Slot {
            sequence,
            segment: sealed.into(),
        });

        self.active(config)?;
        self.evict(config.max_segments)
    }

    /// Deletes the oldest archived segments until at most `max_segments`
    /// remain. The active segment is never evicted.
    fn evict(&mut self, max_segments: usize) -> CoreResult<()> {
        while self.segments.len() > max_segments {
            match self.segments.pop_front() {
                Some(Slot {
                    sequence,
                    segment: Segment::Archived(archived),
                }) => {
                    let messages = archived.message_count();
                    archived.remove()?;
                    self.dir.sync()?;
                    info!(sequence, messages, "evicted segment");
                }
                Some(slot) => {
                    self.segments.push_front(slot);
                    break;
                }
                None => break,
            }
        }
        Ok(())
    }
}
