//! Sender-side splitting of encoded frames into datagrams
//!
//! Mirrors what the phone-side sender does: cut the encoded image into
//! fixed-size chunks and prefix each one with a [`FragmentHeader`].

use thiserror::Error;

use crate::fragment_header::{FragmentHeader, HEADER_LEN};

/// Payload bytes per datagram used by the reference sender
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// Errors that can occur while packetizing a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketizeError {
    /// The payload size per datagram must be non-zero.
    #[error("max payload size must be greater than zero")]
    ZeroPayloadSize,

    /// The frame would need more fragments than the header can express.
    #[error("frame of {frame_len} bytes needs {fragments} fragments (limit 65535)")]
    TooManyFragments {
        /// Encoded frame length in bytes.
        frame_len: usize,
        /// Number of fragments the frame would need.
        fragments: usize,
    },
}

/// Split an encoded frame into ready-to-send datagrams
///
/// Each datagram is `header + chunk`, with chunks of at most `max_payload`
/// bytes. An empty frame yields no datagrams.
///
/// # Errors
///
/// Returns [`PacketizeError::ZeroPayloadSize`] if `max_payload` is zero and
/// [`PacketizeError::TooManyFragments`] if the frame needs more than
/// `u16::MAX` fragments.
pub fn packetize(
    frame_id: u16,
    frame: &[u8],
    max_payload: usize,
) -> Result<Vec<Vec<u8>>, PacketizeError> {
    if max_payload == 0 {
        return Err(PacketizeError::ZeroPayloadSize);
    }

    let fragments = frame.len().div_ceil(max_payload);
    let fragment_count = u16::try_from(fragments).map_err(|_| PacketizeError::TooManyFragments {
        frame_len: frame.len(),
        fragments,
    })?;

    let datagrams = frame
        .chunks(max_payload)
        .zip(0u16..)
        .map(|(chunk, index)| {
            let header = FragmentHeader::new(frame_id, index, fragment_count);
            let mut datagram = Vec::with_capacity(HEADER_LEN + chunk.len());
            datagram.extend_from_slice(&header.to_bytes());
            datagram.extend_from_slice(chunk);
            datagram
        })
        .collect();

    Ok(datagrams)
}
