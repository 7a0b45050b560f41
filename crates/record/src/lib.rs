//! The on-the-wire result record every plugin event produces, and its
//! fixed binary layout on disk.
//!
//! A record is `id (48 bytes) || length (4 bytes, little-endian) || payload
//! (length bytes, length <= MAX_PAYLOAD_LEN)` — no padding, no sentinel.
//! `id` is always a [`Stream`](hpcsim_stream::Stream)'s
//! [`digest`](hpcsim_stream::Stream::digest), making every record's identity
//! a pure function of which event produced it.

use thiserror::Error;

/// Upper bound on a single record's payload, matching the original ABI's
/// `TResult::fResult[0x800]` buffer.
pub const MAX_PAYLOAD_LEN: usize = 0x800;

/// Width of the identity field, matching the original ABI's digest buffer.
pub const ID_LEN: usize = 48;

/// A single plugin result, addressed by the digest of the stream that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    id: [u8; ID_LEN],
    payload: Vec<u8>,
}

/// Failure modes for building or parsing a [`ResultRecord`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// A plugin (or a malformed file) produced a payload larger than
    /// [`MAX_PAYLOAD_LEN`].
    #[error("payload length {0} exceeds maximum of {MAX_PAYLOAD_LEN}")]
    PayloadTooLarge(usize),
    /// The input ended before a complete record header could be read.
    #[error("truncated record header")]
    TruncatedHeader,
    /// The header declared more payload bytes than were actually present.
    #[error("truncated record payload: expected {expected}, got {actual}")]
    TruncatedPayload {
        /// Bytes the header promised.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

impl ResultRecord {
    /// Builds a record, rejecting payloads over [`MAX_PAYLOAD_LEN`].
    pub fn new(id: [u8; ID_LEN], payload: Vec<u8>) -> Result<Self, RecordError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RecordError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { id, payload })
    }

    /// The producing stream's digest.
    pub fn id(&self) -> &[u8; ID_LEN] {
        &self.id
    }

    /// The plugin-supplied payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total on-wire size of this record: `48 + 4 + payload.len()`.
    pub fn encoded_len(&self) -> usize {
        ID_LEN + 4 + self.payload.len()
    }

    /// Serializes this record to its fixed binary layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.id);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parses one record from the front of `bytes`, returning the record and
    /// the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), RecordError> {
        if bytes.len() < ID_LEN + 4 {
            return Err(RecordError::TruncatedHeader);
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&bytes[0..ID_LEN]);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[ID_LEN..ID_LEN + 4]);
        let length = u32::from_le_bytes(len_bytes) as usize;
        if length > MAX_PAYLOAD_LEN {
            return Err(RecordError::PayloadTooLarge(length));
        }
        let body_start = ID_LEN + 4;
        let body_end = body_start + length;
        if bytes.len() < body_end {
            return Err(RecordError::TruncatedPayload {
                expected: length,
                actual: bytes.len() - body_start,
            });
        }
        let payload = bytes[body_start..body_end].to_vec();
        Ok((Self { id, payload }, body_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let record = ResultRecord::new([7u8; ID_LEN], vec![1, 2, 3, 4]).unwrap();
        let bytes = record.encode();
        assert_eq!(bytes.len(), record.encoded_len());
        let (decoded, consumed) = ResultRecord::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, record);
    }

    #[test]
    fn rejects_oversized_payload() {
        let err = ResultRecord::new([0u8; ID_LEN], vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert_eq!(err, RecordError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1));
    }

    #[test]
    fn decode_reports_truncated_header() {
        let err = ResultRecord::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(err, RecordError::TruncatedHeader);
    }

    #[test]
    fn decode_reports_truncated_payload() {
        let record = ResultRecord::new([1u8; ID_LEN], vec![9, 9, 9]).unwrap();
        let mut bytes = record.encode();
        bytes.truncate(bytes.len() - 1);
        let err = ResultRecord::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            RecordError::TruncatedPayload {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn decode_consumes_only_its_own_bytes_from_a_longer_buffer() {
        let a = ResultRecord::new([1u8; ID_LEN], vec![1, 2]).unwrap();
        let b = ResultRecord::new([2u8; ID_LEN], vec![3, 4, 5]).unwrap();
        let mut bytes = a.encode();
        bytes.extend_from_slice(&b.encode());
        let (first, consumed) = ResultRecord::decode(&bytes).unwrap();
        assert_eq!(first, a);
        let (second, _) = ResultRecord::decode(&bytes[consumed..]).unwrap();
        assert_eq!(second, b);
    }
}
