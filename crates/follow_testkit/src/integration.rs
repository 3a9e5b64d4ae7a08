//! Cross-crate integration test helpers.
//!
//! Provides a harness that tracks everything appended to a queue and
//! checks what the queue hands back against it.

use crate::fixtures::TestQueue;
use follow_core::{Message, MessageId, QueueConfig};

/// A test harness for integration testing.
pub struct QueueHarness {
    /// The queue under test.
    pub queue: TestQueue,
    /// Every appended message, in append order.
    appended: Vec<Message>,
}

impl QueueHarness {
    /// Creates a harness around a queue with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            queue: TestQueue::with_config(config),
            appended: Vec::new(),
        }
    }

    /// Appends a message and tracks it for later verification.
    pub fn append(&mut self, kind: &str, body: &[u8]) -> MessageId {
        let id = self.queue.append(kind, body).expect("Failed to append");
        if let Some(last) = self.appended.last() {
            assert!(id > last.id, "identifiers must increase: {id} after {}", last.id);
        }
        self.appended.push(Message {
            id,
            kind: kind.to_string(),
            body: body.to_vec(),
        });
        id
    }

    /// Closes and reopens the queue.
    pub fn reopen(&mut self) {
        self.queue.reopen();
    }

    /// Verifies that the queue returns exactly the newest tracked messages,
    /// in order, and returns how many are retained.
    ///
    /// Eviction may drop a prefix of what was appended, never anything in
    /// the middle or at the end.
    pub fn verify_all(&self) -> usize {
        let retained = self.queue.read_all();
        assert!(
            retained.len() <= self.appended.len(),
            "queue returned {} messages, only {} were appended",
            retained.len(),
            self.appended.len()
        );

        let expected = &self.appended[self.appended.len() - retained.len()..];
        assert_eq!(retained, expected, "retained messages are not the newest appended");
        retained.len()
    }

    /// Returns the count of tracked messages.
    pub fn tracked_count(&self) -> usize {
        self.appended.len()
    }

    /// Returns the tracked messages.
    pub fn tracked(&self) -> &[Message] {
        &self.appended
    }
}

/// Segment rotation scenarios.
pub mod rotation {
    use super::*;

    /// Appends enough messages to fill several segments and checks that the
    /// queue rotated instead of rejecting anything.
    pub fn test_rotation_preserves_messages(harness: &mut QueueHarness, count: u8) {
        let before = harness.queue.segment_count().expect("Failed to count segments");
        for n in 0..count {
            harness.append("rotation", &[n; 16]);
        }
        let after = harness.queue.segment_count().expect("Failed to count segments");
        assert!(after > before, "expected rotation: {before} -> {after}");
        assert_eq!(harness.verify_all(), harness.tracked_count());
    }
}

/// Segment eviction scenarios.
pub mod eviction {
    use super::*;

    /// Appends until eviction must have happened and checks the bound on
    /// retained segments and that the survivors are the newest.
    pub fn test_eviction_bound(harness: &mut QueueHarness, count: u8) {
        let max = harness.queue.config().max_segments;
        for n in 0..count {
            harness.append("eviction", &[n; 10]);
            let segments = harness.queue.segment_count().expect("Failed to count segments");
            assert!(segments <= max, "{segments} segments exceed the budget of {max}");
        }

        let retained = harness.verify_all();
        assert!(retained < harness.tracked_count(), "expected eviction");

        let infos = harness.queue.segments().expect("Failed to list segments");
        for pair in infos.windows(2) {
            assert_eq!(pair[0].sequence + 1, pair[1].sequence);
        }
    }
}

/// Reopen scenarios.
pub mod recovery {
    use super::*;

    /// Checks that a reopened queue reads back the same messages and keeps
    /// issuing larger identifiers.
    pub fn test_reopen_is_idempotent(harness: &mut QueueHarness) {
        let before = harness.queue.read_all();
        harness.reopen();
        assert_eq!(harness.queue.read_all(), before);
        harness.reopen();
        assert_eq!(harness.queue.read_all(), before);

        harness.append("after-reopen", b"x");
        harness.verify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::SMALL_SEGMENT_SIZE;
    use crate::generators::{queue_ops_strategy, QueueOp};
    use proptest::prelude::*;

    fn small(max_segments: usize) -> QueueHarness {
        QueueHarness::new(
            QueueConfig::new()
                .segment_size(SMALL_SEGMENT_SIZE)
                .max_segments(max_segments),
        )
    }

    #[test]
    fn test_queue_harness() {
        let mut harness = QueueHarness::new(QueueConfig::new().segment_size(4096));
        harness.append("test", &[1, 2, 3]);
        harness.append("test2", &[4, 5, 6]);

        assert_eq!(harness.tracked_count(), 2);
        assert_eq!(harness.verify_all(), 2);
    }

    #[test]
    fn test_rotation() {
        let mut harness = QueueHarness::new(
            QueueConfig::new().segment_size(256).max_segments(100),
        );
        rotation::test_rotation_preserves_messages(&mut harness, 30);
    }

    #[test]
    fn test_eviction() {
        let mut harness = small(3);
        eviction::test_eviction_bound(&mut harness, 20);
        assert_eq!(harness.verify_all(), 6);
    }

    #[test]
    fn test_recovery() {
        let mut harness = small(10);
        for n in 0..7u8 {
            harness.append("t", &[n; 10]);
        }
        recovery::test_reopen_is_idempotent(&mut harness);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn queue_matches_model(ops in queue_ops_strategy(40)) {
            let mut harness = QueueHarness::new(
                QueueConfig::new().segment_size(1024).max_segments(4),
            );
            for op in ops {
                match op {
                    QueueOp::Append { kind, body } => {
                        harness.append(&kind, &body);
                    }
                    QueueOp::Reopen => harness.reopen(),
                }
                prop_assert!(harness.queue.segment_count().unwrap() <= 4);
            }

            let retained = harness.verify_all();
            if harness.tracked_count() > 0 {
                prop_assert!(retained > 0);
            }
        }
    }
}
