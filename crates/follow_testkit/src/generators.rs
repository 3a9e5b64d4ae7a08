//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use follow_core::{MessageId, MAX_TYPE_LEN};
use proptest::prelude::*;

/// Strategy for generating message identifiers, the reserved zero id
/// excluded.
pub fn message_id_strategy() -> impl Strategy<Value = MessageId> {
    prop::array::uniform16(any::<u8>())
        .prop_map(MessageId::from_bytes)
        .prop_filter("the zero id is reserved", |id| !id.is_zero())
}

/// Strategy for generating valid type tags.
pub fn message_kind_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.]{0,31}").expect("Invalid regex")
}

/// Strategy for generating type tags right up to the length limit.
pub fn long_kind_strategy() -> impl Strategy<Value = String> {
    (0..=MAX_TYPE_LEN).prop_map(|len| "k".repeat(len))
}

/// Strategy for generating message bodies (arbitrary bytes).
pub fn message_body_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for generating strictly increasing identifier sequences, as a
/// segment stores them.
pub fn sorted_ids_strategy(max_len: usize) -> impl Strategy<Value = Vec<MessageId>> {
    prop::collection::btree_set(message_id_strategy(), 0..=max_len)
        .prop_map(|ids| ids.into_iter().collect())
}

/// A queue operation for model-based testing.
#[derive(Debug, Clone)]
pub enum QueueOp {
    /// Append a message.
    Append {
        /// Type tag.
        kind: String,
        /// Body.
        body: Vec<u8>,
    },
    /// Close the queue and open it again.
    Reopen,
}

/// Strategy for generating queue operations, mostly appends.
pub fn queue_op_strategy() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        9 => (message_kind_strategy(), message_body_strategy())
            .prop_map(|(kind, body)| QueueOp::Append { kind, body }),
        1 => Just(QueueOp::Reopen),
    ]
}

/// Strategy for generating a sequence of queue operations.
pub fn queue_ops_strategy(max_ops: usize) -> impl Strategy<Value = Vec<QueueOp>> {
    prop::collection::vec(queue_op_strategy(), 1..=max_ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn ids_are_never_zero(id in message_id_strategy()) {
            prop_assert!(!id.is_zero());
        }

        #[test]
        fn sorted_ids_are_strictly_increasing(ids in sorted_ids_strategy(32)) {
            for pair in ids.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }

        #[test]
        fn kinds_fit_the_format(kind in message_kind_strategy()) {
            prop_assert!(!kind.is_empty());
            prop_assert!(kind.len() <= MAX_TYPE_LEN);
        }

        #[test]
        fn long_kinds_stay_within_limit(kind in long_kind_strategy()) {
            prop_assert!(kind.len() <= MAX_TYPE_LEN);
        }
    }
}
