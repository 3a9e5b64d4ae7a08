//! Message record encoding.
//!
//! Every segment, active or archived, is a run of records packed from
//! offset 0:
//!
//! ```text
//! | id (16) | type_len (1) | type (type_len) | body_len (4, BE) | body (body_len) | checksum (8, BE) |
//! ```
//!
//! The checksum is a keyed HighwayHash-64 over every preceding byte of the
//! record. It catches torn writes and bit rot; the key is a fixed constant
//! and offers no protection against deliberate tampering.
//!
//! A record whose identifier is all zeros does not exist: it marks where
//! the written part of a pre-zeroed segment ends.

use crate::error::{CoreError, CoreResult};
use crate::id::{MessageId, ID_LEN};
use highway::{HighwayHash, HighwayHasher, Key};
use serde::Serialize;
use std::borrow::Cow;

/// Longest allowed type tag, in bytes.
pub const MAX_TYPE_LEN: usize = u8::MAX as usize;

/// Largest allowed body, in bytes.
pub const MAX_BODY_LEN: usize = i32::MAX as usize;

const TYPE_LEN_SIZE: usize = 1;
const BODY_LEN_SIZE: usize = 4;
const CHECKSUM_SIZE: usize = 8;

/// Bytes a record occupies on top of its type tag and body.
pub const RECORD_OVERHEAD: usize = ID_LEN + TYPE_LEN_SIZE + BODY_LEN_SIZE + CHECKSUM_SIZE;

/// Key for the record checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumKey(pub [u64; 4]);

/// The key every follow segment is written with.
///
/// This is the little-endian reading of the 32-byte key
/// `70d7994cf728e46e23b7df19e0980a34c22ed448393da3581dcec378c67db2a3`.
pub const DEFAULT_CHECKSUM_KEY: ChecksumKey = ChecksumKey([
    0x6ee4_28f7_4c99_d770,
    0x340a_98e0_19df_b723,
    0x58a3_3d39_48d4_2ec2,
    0xa3b2_7dc6_78c3_ce1d,
]);

impl Default for ChecksumKey {
    fn default() -> Self {
        DEFAULT_CHECKSUM_KEY
    }
}

impl ChecksumKey {
    /// Computes the checksum of `data` under this key.
    #[must_use]
    pub fn checksum(&self, data: &[u8]) -> u64 {
        HighwayHasher::new(Key(self.0)).hash64(data)
    }
}

/// An owned message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body.
    pub body: Vec<u8>,
}

/// A decoded record borrowing from segment bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView<'a> {
    /// Message identifier.
    pub id: MessageId,
    /// Type tag. Tags that are not valid UTF-8 are decoded lossily, since
    /// other writers of the format treat them as plain bytes.
    pub kind: Cow<'a, str>,
    /// Message body.
    pub body: &'a [u8],
}

impl MessageView<'_> {
    /// Copies the view into an owned [`Message`].
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id,
            kind: self.kind.clone().into_owned(),
            body: self.body.to_vec(),
        }
    }
}

/// Returns the encoded size of a record with the given type and body lengths.
#[must_use]
pub const fn encoded_len(type_len: usize, body_len: usize) -> usize {
    RECORD_OVERHEAD + type_len + body_len
}

/// Checks the type tag and body against the format limits.
///
/// # Errors
///
/// Returns `InvalidMessage` if the type tag is longer than 255 bytes or the
/// body is larger than 2^31 - 1 bytes.
pub fn validate(kind: &str, body: &[u8]) -> CoreResult<()> {
    if kind.len() > MAX_TYPE_LEN {
        return Err(CoreError::invalid_message(format!(
            "type of the message is too long: {} bytes, at most {MAX_TYPE_LEN}",
            kind.len()
        )));
    }
    if body.len() > MAX_BODY_LEN {
        return Err(CoreError::invalid_message(format!(
            "body of the message is too large: {} bytes, at most {MAX_BODY_LEN}",
            body.len()
        )));
    }
    Ok(())
}

/// Encodes one record.
///
/// # Errors
///
/// Returns `InvalidMessage` if the message exceeds the format limits or the
/// identifier is the reserved zero value.
pub fn encode(id: MessageId, kind: &str, body: &[u8], key: &ChecksumKey) -> CoreResult<Vec<u8>> {
    validate(kind, body)?;
    if id.is_zero() {
        return Err(CoreError::invalid_message(
            "the all-zero message id is reserved",
        ));
    }

    let mut buf = Vec::with_capacity(encoded_len(kind.len(), body.len()));

    buf.extend_from_slice(id.as_bytes());

    // Both lengths were bounds-checked by validate().
    buf.push(kind.len() as u8);
    buf.extend_from_slice(kind.as_bytes());

    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);

    let checksum = key.checksum(&buf);
    buf.extend_from_slice(&checksum.to_be_bytes());

    Ok(buf)
}

/// Decodes the record starting at `offset`.
///
/// Returns `Ok(None)` when the identifier at `offset` is all zeros, or when
/// fewer than 16 bytes remain and they are all zero (free space too small
/// to hold a record). Otherwise returns the record and the number of bytes
/// it occupies.
///
/// # Errors
///
/// - `SegmentCorruption` if a length field points past the available bytes,
///   or a partial identifier is non-zero
/// - `ChecksumMismatch` if the stored checksum does not match
pub fn decode<'a>(
    data: &'a [u8],
    offset: usize,
    key: &ChecksumKey,
) -> CoreResult<Option<(MessageView<'a>, usize)>> {
    let rest = data.get(offset..).unwrap_or_default();

    let Some(id) = MessageId::from_slice(rest) else {
        if rest.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        return Err(corruption(offset, "not enough bytes to get message id"));
    };
    if id.is_zero() {
        return Ok(None);
    }

    let mut pos = ID_LEN;

    let type_len = usize::from(*rest.get(pos).ok_or_else(|| {
        corruption(offset, format!("message {id}: can't get type length"))
    })?);
    pos += TYPE_LEN_SIZE;

    let type_bytes = rest
        .get(pos..pos + type_len)
        .ok_or_else(|| corruption(offset, format!("message {id}: can't get type")))?;
    pos += type_len;

    let len_bytes: [u8; BODY_LEN_SIZE] = rest
        .get(pos..pos + BODY_LEN_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| corruption(offset, format!("message {id}: can't get body length")))?;
    let body_len = u32::from_be_bytes(len_bytes) as usize;
    pos += BODY_LEN_SIZE;

    let body = pos
        .checked_add(body_len)
        .and_then(|end| rest.get(pos..end))
        .ok_or_else(|| {
            corruption(
                offset,
                format!("message {id}: body length {body_len} exceeds segment"),
            )
        })?;
    pos += body_len;

    let stored: [u8; CHECKSUM_SIZE] = rest
        .get(pos..pos + CHECKSUM_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            corruption(offset, format!("message {id}: not enough bytes for checksum"))
        })?;
    let expected = u64::from_be_bytes(stored);
    let actual = key.checksum(&rest[..pos]);
    if expected != actual {
        return Err(CoreError::ChecksumMismatch {
            offset,
            expected,
            actual,
        });
    }
    pos += CHECKSUM_SIZE;

    let kind = String::from_utf8_lossy(type_bytes);
    Ok(Some((MessageView { id, kind, body }, pos)))
}

fn corruption(offset: usize, message: impl std::fmt::Display) -> CoreError {
    CoreError::segment_corruption(format!("record at offset {offset}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(last: u8) -> MessageId {
        let mut bytes = [0u8; 16];
        bytes[0] = 1;
        bytes[15] = last;
        MessageId::from_bytes(bytes)
    }

    #[test]
    fn roundtrip() {
        let encoded = encode(id(1), "test", &[1, 2, 3], &DEFAULT_CHECKSUM_KEY).unwrap();
        assert_eq!(encoded.len(), encoded_len(4, 3));

        let (view, len) = decode(&encoded, 0, &DEFAULT_CHECKSUM_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(len, encoded.len());
        assert_eq!(view.id, id(1));
        assert_eq!(view.kind, "test");
        assert_eq!(view.body, &[1, 2, 3]);
    }

    #[test]
    fn non_utf8_type_decodes_lossily() {
        let mut record = id(7).as_bytes().to_vec();
        record.push(2);
        record.extend_from_slice(&[0xff, b'k']);
        record.extend_from_slice(&1u32.to_be_bytes());
        record.push(42);
        let checksum = DEFAULT_CHECKSUM_KEY.checksum(&record);
        record.extend_from_slice(&checksum.to_be_bytes());

        let (view, len) = decode(&record, 0, &DEFAULT_CHECKSUM_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(len, record.len());
        assert_eq!(view.kind, "\u{fffd}k");
        assert_eq!(view.body, &[42]);
        assert_eq!(view.to_message().kind, "\u{fffd}k");
    }

    #[test]
    fn layout_is_big_endian() {
        let encoded = encode(id(1), "ab", &[9; 5], &DEFAULT_CHECKSUM_KEY).unwrap();
        assert_eq!(&encoded[..16], id(1).as_bytes());
        assert_eq!(encoded[16], 2);
        assert_eq!(&encoded[17..19], b"ab");
        assert_eq!(&encoded[19..23], &[0, 0, 0, 5]);
        assert_eq!(&encoded[23..28], &[9; 5]);

        let checksum = DEFAULT_CHECKSUM_KEY.checksum(&encoded[..28]);
        assert_eq!(&encoded[28..], &checksum.to_be_bytes());
    }

    #[test]
    fn zero_id_means_no_message() {
        assert!(decode(&[0u8; 64], 0, &DEFAULT_CHECKSUM_KEY)
            .unwrap()
            .is_none());
        assert!(decode(&[0u8; 64], 60, &DEFAULT_CHECKSUM_KEY)
            .unwrap()
            .is_none());
        assert!(decode(&[0u8; 64], 64, &DEFAULT_CHECKSUM_KEY)
            .unwrap()
            .is_none());
    }

    #[test]
    fn partial_nonzero_id_is_corruption() {
        let mut data = [0u8; 8];
        data[3] = 1;
        let err = decode(&data, 0, &DEFAULT_CHECKSUM_KEY).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn truncated_record_is_corruption() {
        let encoded = encode(id(1), "test", &[1, 2, 3], &DEFAULT_CHECKSUM_KEY).unwrap();
        for cut in 17..encoded.len() {
            let err = decode(&encoded[..cut], 0, &DEFAULT_CHECKSUM_KEY).unwrap_err();
            assert!(err.is_corruption(), "cut at {cut}");
        }
    }

    #[test]
    fn body_length_past_end_is_corruption() {
        let mut encoded = encode(id(1), "t", &[1], &DEFAULT_CHECKSUM_KEY).unwrap();
        encoded[18..22].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = decode(&encoded, 0, &DEFAULT_CHECKSUM_KEY).unwrap_err();
        assert!(matches!(err, CoreError::SegmentCorruption { .. }));
    }

    #[test]
    fn other_key_fails_checksum() {
        let encoded = encode(id(1), "test", b"body", &DEFAULT_CHECKSUM_KEY).unwrap();
        let other = ChecksumKey([1, 2, 3, 4]);
        let err = decode(&encoded, 0, &other).unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { offset: 0, .. }));

        let reencoded = encode(id(1), "test", b"body", &other).unwrap();
        assert!(decode(&reencoded, 0, &other).unwrap().is_some());
    }

    #[test]
    fn limits_are_enforced() {
        let long_type = "x".repeat(256);
        let err = encode(id(1), &long_type, &[], &DEFAULT_CHECKSUM_KEY).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMessage { .. }));

        let max_type = "x".repeat(255);
        assert!(encode(id(1), &max_type, &[], &DEFAULT_CHECKSUM_KEY).is_ok());
    }

    #[test]
    fn zero_id_is_rejected() {
        let err = encode(MessageId::ZERO, "t", &[], &DEFAULT_CHECKSUM_KEY).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMessage { .. }));
    }

    #[test]
    fn decodes_at_offset() {
        let mut data = encode(id(1), "a", &[1], &DEFAULT_CHECKSUM_KEY).unwrap();
        let first_len = data.len();
        data.extend(encode(id(2), "b", &[2, 2], &DEFAULT_CHECKSUM_KEY).unwrap());
        data.extend([0u8; 32]);

        let (second, len) = decode(&data, first_len, &DEFAULT_CHECKSUM_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(second.to_message().kind, "b");
        assert!(decode(&data, first_len + len, &DEFAULT_CHECKSUM_KEY)
            .unwrap()
            .is_none());
    }

    proptest! {
        #[test]
        fn roundtrip_any_message(
            raw_id in prop::array::uniform16(any::<u8>()).prop_filter("non-zero", |b| b != &[0u8; 16]),
            kind in "[a-zA-Z0-9._-]{0,64}",
            body in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let id = MessageId::from_bytes(raw_id);
            let encoded = encode(id, &kind, &body, &DEFAULT_CHECKSUM_KEY).unwrap();
            let (view, len) = decode(&encoded, 0, &DEFAULT_CHECKSUM_KEY).unwrap().unwrap();

            prop_assert_eq!(len, encoded_len(kind.len(), body.len()));
            prop_assert_eq!(view.to_message(), Message { id, kind, body });
        }

        #[test]
        fn any_flipped_byte_is_detected(
            body in prop::collection::vec(any::<u8>(), 1..64),
            position in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let encoded = encode(id(7), "kind", &body, &DEFAULT_CHECKSUM_KEY).unwrap();
            // Everything before the checksum: id, type length, type, body length, body.
            let covered = encoded.len() - CHECKSUM_SIZE;
            let mut damaged = encoded.clone();
            damaged[position.index(covered)] ^= flip;

            match decode(&damaged, 0, &DEFAULT_CHECKSUM_KEY) {
                Err(err) => prop_assert!(err.is_corruption()),
                // Flipping the id to all zeros turns the record into free space.
                Ok(None) => prop_assert!(damaged[..16].iter().all(|&b| b == 0)),
                Ok(Some(_)) => prop_assert!(false, "corruption went unnoticed"),
            }
        }
    }
}
