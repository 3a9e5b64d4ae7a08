//! Test fixtures and queue helpers.
//!
//! Provides convenience functions for setting up temporary queues
//! and common test scenarios.

use follow_core::{Message, MessageId, Queue, QueueConfig};
use std::path::Path;
use tempfile::TempDir;

/// Segment capacity used by [`TestQueue::small`]: two messages with a one
/// byte type tag and a 10 byte body fill a segment.
pub const SMALL_SEGMENT_SIZE: u64 = 100;

/// A test queue in a temporary directory with automatic cleanup.
pub struct TestQueue {
    /// The queue instance.
    pub queue: Queue,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestQueue {
    /// Creates a queue with the default configuration.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Creates a queue with tiny segments, so rotation and eviction happen
    /// after a handful of appends.
    pub fn small(max_segments: usize) -> Self {
        Self::with_config(
            QueueConfig::new()
                .segment_size(SMALL_SEGMENT_SIZE)
                .max_segments(max_segments),
        )
    }

    /// Creates a queue with the given configuration.
    pub fn with_config(config: QueueConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let queue =
            Queue::open_with_config(temp_dir.path(), config).expect("Failed to open queue");
        Self { queue, temp_dir }
    }

    /// Returns the queue directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the queue and opens it again from disk with the same
    /// configuration.
    pub fn reopen(&mut self) {
        let config = self.queue.config().clone();
        self.queue.close().expect("Failed to close queue");
        self.queue =
            Queue::open_with_config(self.temp_dir.path(), config).expect("Failed to reopen queue");
    }

    /// Reads every retained message, oldest first.
    pub fn read_all(&self) -> Vec<Message> {
        read_all(&self.queue)
    }
}

impl Default for TestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestQueue {
    type Target = Queue;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

/// Reads every retained message of `queue`, oldest first.
pub fn read_all(queue: &Queue) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut cursor = MessageId::ZERO;
    while let Some(message) = queue.next_after(&cursor).expect("Failed to read queue") {
        cursor = message.id;
        messages.push(message);
    }
    messages
}

/// Runs a test with a temporary queue using the default configuration.
///
/// # Example
///
/// ```rust,ignore
/// use follow_testkit::with_temp_queue;
///
/// #[test]
/// fn my_test() {
///     with_temp_queue(|queue| {
///         queue.append("event", b"payload").unwrap();
///     });
/// }
/// ```
pub fn with_temp_queue<F, R>(f: F) -> R
where
    F: FnOnce(&Queue) -> R,
{
    let test_queue = TestQueue::new();
    f(&test_queue.queue)
}

/// Runs a test with a temporary queue that rotates after every second
/// small message.
pub fn with_small_queue<F, R>(max_segments: usize, f: F) -> R
where
    F: FnOnce(&Queue, &Path) -> R,
{
    let test_queue = TestQueue::small(max_segments);
    f(&test_queue.queue, test_queue.path())
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a small-segment queue holding `count` messages whose bodies
    /// are ten copies of their index.
    pub fn populated_queue(count: u8, max_segments: usize) -> (TestQueue, Vec<MessageId>) {
        let queue = TestQueue::small(max_segments);
        let ids = (0..count)
            .map(|n| queue.append("t", &[n; 10]).expect("Failed to append"))
            .collect();
        (queue, ids)
    }
}
