//! Message identifiers.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of an encoded identifier in bytes.
pub const ID_LEN: usize = 16;

/// Length of the textual form, e.g. `00010203-0405-0607-0809-0a0b0c0d0e0f`.
const HYPHENATED_LEN: usize = 36;

/// Identifier of a stored message.
///
/// Message IDs are 128-bit, time-ordered values that are:
/// - Totally ordered by byte-wise comparison
/// - Strictly increasing in append order, within and across segments
/// - Never all-zero ([`MessageId::ZERO`] marks unwritten segment space)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId([u8; ID_LEN]);

impl MessageId {
    /// The reserved all-zero identifier.
    ///
    /// On disk it marks the start of free space in an active segment.
    /// As a lookup key it sorts before every real message.
    pub const ZERO: Self = Self([0; ID_LEN]);

    /// Creates a message ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a message ID from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }

    /// Creates a message ID from the first 16 bytes of a slice.
    ///
    /// Returns `None` if the slice is shorter than 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; ID_LEN] = slice.get(..ID_LEN)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Returns `true` for the reserved all-zero identifier.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the next identifier in byte order, if there is one.
    #[must_use]
    pub fn successor(&self) -> Option<Self> {
        u128::from_be_bytes(self.0)
            .checked_add(1)
            .map(|next| Self(next.to_be_bytes()))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.to_uuid())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid().hyphenated())
    }
}

impl FromStr for MessageId {
    type Err = CoreError;

    /// Parses the hyphenated form `123e4567-e89b-12d3-a456-426614174000`.
    fn from_str(s: &str) -> CoreResult<Self> {
        if s.len() != HYPHENATED_LEN {
            return Err(CoreError::invalid_message(format!(
                "invalid message id {s:?}: expected {HYPHENATED_LEN} characters"
            )));
        }
        Uuid::try_parse(s)
            .map(Self::from_uuid)
            .map_err(|e| CoreError::invalid_message(format!("invalid message id {s:?}: {e}")))
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl From<[u8; ID_LEN]> for MessageId {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<MessageId> for [u8; ID_LEN] {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

/// Issues strictly increasing, time-ordered message IDs.
///
/// IDs are UUIDv7 values. When the clock produces a value that does not sort
/// after the previous ID (same millisecond, or a clock step backwards) the
/// generator falls back to the previous ID plus one.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: MessageId,
}

impl IdGenerator {
    /// Creates a generator whose IDs sort after `last`.
    #[must_use]
    pub fn starting_after(last: MessageId) -> Self {
        Self { last }
    }

    /// Returns the most recently issued (or seeded) ID.
    #[must_use]
    pub fn last(&self) -> MessageId {
        self.last
    }

    /// Issues the next ID.
    ///
    /// # Errors
    ///
    /// Fails only once the 128-bit space after the seed is exhausted.
    pub fn next_id(&mut self) -> CoreResult<MessageId> {
        let candidate = MessageId::from_uuid(Uuid::now_v7());
        let id = if candidate > self.last {
            candidate
        } else {
            self.last
                .successor()
                .ok_or_else(|| CoreError::invalid_message("message id space exhausted"))?
        };
        self.last = id;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_hyphenated() {
        let id = MessageId::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(id.to_string(), "00010203-0405-0607-0809-0a0b0c0d0e0f");
        assert_eq!(format!("|{id}|"), "|00010203-0405-0607-0809-0a0b0c0d0e0f|");
    }

    #[test]
    fn parse_hyphenated() {
        let parsed: MessageId = "00010203-0405-0607-0809-0a0b0c0d0e0f".parse().unwrap();
        assert_eq!(
            parsed,
            MessageId::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15])
        );
    }

    #[test]
    fn parse_rejects_other_forms() {
        assert!("000102030405060708090a0b0c0d0e0f".parse::<MessageId>().is_err());
        assert!("not-a-uuid".parse::<MessageId>().is_err());
        assert!("0001020g-0405-0607-0809-0a0b0c0d0e0f"
            .parse::<MessageId>()
            .is_err());
    }

    #[test]
    fn serializes_as_string() {
        let id = MessageId::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""00010203-0405-0607-0809-0a0b0c0d0e0f""#);

        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ordering_is_bytewise() {
        let low = MessageId::from_bytes([0, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let high = MessageId::from_bytes([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(MessageId::ZERO < low);
        assert!(low < high);
    }

    #[test]
    fn from_slice() {
        assert!(MessageId::from_slice(&[1u8; 16]).is_some());
        assert!(MessageId::from_slice(&[1u8; 20]).is_some());
        assert!(MessageId::from_slice(&[1u8; 15]).is_none());
    }

    #[test]
    fn successor_carries() {
        let id = MessageId::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff]);
        let next = id.successor().unwrap();
        assert_eq!(next.as_bytes()[14..], [1, 0]);
        assert!(MessageId::from_bytes([0xff; 16]).successor().is_none());
    }

    #[test]
    fn generator_is_strictly_increasing() {
        let mut ids = IdGenerator::default();
        let mut previous = ids.last();
        for _ in 0..1000 {
            let id = ids.next_id().unwrap();
            assert!(id > previous);
            assert!(!id.is_zero());
            previous = id;
        }
    }

    #[test]
    fn generator_respects_seed_from_the_future() {
        let seed = MessageId::from_bytes([0xf0; 16]);
        let mut ids = IdGenerator::starting_after(seed);

        let id = ids.next_id().unwrap();
        assert_eq!(Some(id), seed.successor());
    }
}
