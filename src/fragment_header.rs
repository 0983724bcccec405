//! Fragment header codec
//!
//! Every datagram starts with a fixed 6-byte header followed by one fragment
//! of an encoded frame.
//!
//! # Wire Format
//!
//! ```text
//! +----------------+------------------+------------------+-----------------+
//! | frame_id (u16) | fragment_index   | fragment_count   | payload ...     |
//! |   big-endian   |  (u16, BE)       |  (u16, BE)       |                 |
//! +----------------+------------------+------------------+-----------------+
//!  bytes 0-1        bytes 2-3          bytes 4-5          bytes 6..
//! ```
//!
//! The payload has no length field; it runs to the end of the datagram.
//! Senders are expected to keep whole datagrams within
//! [`DEFAULT_MAX_DATAGRAM_SIZE`]. Anything longer than the receive buffer is
//! truncated by the transport before it ever reaches this codec.

use thiserror::Error;

/// Size of the fragment header in bytes
pub const HEADER_LEN: usize = 6;

/// Assumed maximum datagram size (header included) agreed with the sender
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 1200;

/// Errors produced while decoding a datagram header
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// Datagram is shorter than the fixed header.
    #[error("datagram too short for fragment header: {len} bytes (need 6)")]
    HeaderTooShort {
        /// Length of the offending datagram.
        len: usize,
    },
}

/// Metadata prefixed to every fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentHeader {
    /// Frame this fragment belongs to (wraps at 65536)
    pub frame_id: u16,
    /// Zero-based position of the fragment within its frame
    pub fragment_index: u16,
    /// Total number of fragments in the frame
    pub fragment_count: u16,
}

impl FragmentHeader {
    /// Create a header
    pub fn new(frame_id: u16, fragment_index: u16, fragment_count: u16) -> Self {
        Self {
            frame_id,
            fragment_index,
            fragment_count,
        }
    }

    /// Serialize header to its 6-byte wire form
    ///
    /// Only senders need this; the receiver never encodes headers.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let [f0, f1] = self.frame_id.to_be_bytes();
        let [i0, i1] = self.fragment_index.to_be_bytes();
        let [c0, c1] = self.fragment_count.to_be_bytes();
        [f0, f1, i0, i1, c0, c1]
    }
}

/// Decode a received datagram into its header and payload
///
/// The payload may be empty but is always present on success.
///
/// # Errors
///
/// Returns [`HeaderError::HeaderTooShort`] if the datagram is shorter than
/// [`HEADER_LEN`].
#[inline]
pub fn decode(datagram: &[u8]) -> Result<(FragmentHeader, &[u8]), HeaderError> {
    if datagram.len() < HEADER_LEN {
        return Err(HeaderError::HeaderTooShort {
            len: datagram.len(),
        });
    }

    let (header, payload) = datagram.split_at(HEADER_LEN);
    let header = FragmentHeader {
        frame_id: u16::from_be_bytes([header[0], header[1]]),
        fragment_index: u16::from_be_bytes([header[2], header[3]]),
        fragment_count: u16::from_be_bytes([header[4], header[5]]),
    };

    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_header_fields_big_endian() {
        let data = [0x01, 0x02, 0x00, 0x03, 0x00, 0x10, 0xAA, 0xBB];
        let (header, payload) = decode(&data).unwrap();

        assert_eq!(header.frame_id, 0x0102);
        assert_eq!(header.fragment_index, 3);
        assert_eq!(header.fragment_count, 16);
        assert_eq!(payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_decode_header_only_gives_empty_payload() {
        let data = [0x00, 0x07, 0x00, 0x00, 0x00, 0x01];
        let (header, payload) = decode(&data).unwrap();

        assert_eq!(header, FragmentHeader::new(7, 0, 1));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_decode_max_values() {
        let data = [0xFF; 6];
        let (header, _) = decode(&data).unwrap();

        assert_eq!(header, FragmentHeader::new(u16::MAX, u16::MAX, u16::MAX));
    }

    #[test]
    fn test_reject_short_datagrams() {
        for len in 0..HEADER_LEN {
            let data = vec![0u8; len];
            assert_eq!(decode(&data), Err(HeaderError::HeaderTooShort { len }));
        }
    }

    #[test]
    fn test_to_bytes_matches_wire_layout() {
        let header = FragmentHeader::new(0xBEEF, 0x0102, 0x0A0B);
        assert_eq!(header.to_bytes(), [0xBE, 0xEF, 0x01, 0x02, 0x0A, 0x0B]);
    }

    #[test]
    fn test_error_display() {
        let err = HeaderError::HeaderTooShort { len: 3 };
        assert_eq!(
            err.to_string(),
            "datagram too short for fragment header: 3 bytes (need 6)"
        );
    }
}
