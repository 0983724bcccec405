//! Frame reassembly from fragment datagrams
//!
//! Collects the fragments of the frame currently in flight and hands back the
//! encoded frame once every fragment has arrived. Only one frame is tracked at
//! a time: the first fragment carrying a different `frame_id` abandons
//! whatever was collected so far. Lost fragments therefore cost exactly one
//! frame and never stall the stream.
//!
//! # Usage
//!
//! ```rust,ignore
//! use udpcam_lib::reassembly::{ProcessResult, ReassemblyBuffer};
//!
//! let mut buffer = ReassemblyBuffer::new();
//!
//! for datagram in datagrams {
//!     if let ProcessResult::Frame(frame) = buffer.process_datagram(&datagram) {
//!         // All fragments of `frame.frame_id` arrived
//!         present(&frame.data);
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::fragment_header::{self, FragmentHeader};

/// Errors reported for fragments that cannot be accepted
///
/// None of these are fatal: the fragment is dropped and reassembly carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    /// `fragment_index` is not below `fragment_count`.
    #[error("fragment {index} out of range for frame {frame_id} with {count} fragments")]
    IndexOutOfRange {
        /// Frame the fragment claimed to belong to.
        frame_id: u16,
        /// Offending fragment index.
        index: u16,
        /// Fragment count carried by the same fragment.
        count: u16,
    },

    /// A fragment disagrees with the fragment count latched for its frame.
    #[error("frame {frame_id} expects {expected} fragments but fragment {index} declares {declared}")]
    CountMismatch {
        /// Active frame id.
        frame_id: u16,
        /// Offending fragment index.
        index: u16,
        /// Count latched from the first fragment of the frame.
        expected: u16,
        /// Count declared by the offending fragment.
        declared: u16,
    },

    /// A fragment of the frame just completed arrived while a newer frame is
    /// being collected. It is held back instead of abandoning the newer frame.
    #[error("late fragment {index} for already completed frame {frame_id}")]
    StaleFragment {
        /// Completed frame id.
        frame_id: u16,
        /// Fragment index of the late arrival.
        index: u16,
    },

    /// Assembly found a gap in the collected indices.
    ///
    /// Cannot happen while indices are range-checked on accept; the frame is
    /// dropped if it ever does.
    #[error("frame {frame_id} is missing fragment {index} of {count}")]
    MissingFragment {
        /// Frame being assembled.
        frame_id: u16,
        /// First missing index.
        index: u16,
        /// Expected fragment count.
        count: u16,
    },
}

/// A fully reassembled encoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    /// Frame id shared by all fragments
    pub frame_id: u16,
    /// Fragment payloads concatenated in index order
    pub data: Vec<u8>,
}

/// Outcome of accepting one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// Fragment recorded, frame still incomplete
    Pending,
    /// Fragment completed its frame
    Complete(CompletedFrame),
}

/// Result of processing a raw datagram
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    /// No complete frame yet, continue accumulating
    Accumulating,
    /// Complete frame ready
    Frame(CompletedFrame),
    /// Datagram was dropped (malformed header or rejected fragment)
    Skipped,
}

/// Counters kept across the lifetime of a buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Fragments recorded (duplicates included)
    pub fragments_accepted: u64,
    /// Fragments rejected by validation or held back as late
    pub fragments_rejected: u64,
    /// Datagrams too short to carry a header
    pub datagrams_malformed: u64,
    /// Frames handed out complete
    pub frames_completed: u64,
    /// Incomplete frames dropped because a newer frame started
    pub frames_abandoned: u64,
}

/// Reassembly state for the single frame in flight
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    /// Frame currently being collected
    active_frame_id: Option<u16>,
    /// Collected payloads keyed by fragment index (active frame only)
    fragments: BTreeMap<u16, Vec<u8>>,
    /// Fragment count latched from the first fragment of the active frame
    expected_count: u16,
    /// Id and fragment count of the most recently completed frame
    last_completed: Option<(u16, u16)>,
    /// Late fragments of `last_completed` that arrived while a newer frame was active
    held_back: BTreeMap<u16, Vec<u8>>,
    stats: ReassemblyStats,
}

impl ReassemblyBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame currently being collected, if any
    pub fn active_frame_id(&self) -> Option<u16> {
        self.active_frame_id
    }

    /// Fragment count of the active frame (0 when idle)
    pub fn expected_count(&self) -> u16 {
        self.expected_count
    }

    /// Number of distinct fragments collected for the active frame
    pub fn fragments_collected(&self) -> usize {
        self.fragments.len()
    }

    /// Lifetime counters
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Drop the active frame and forget the last completed one
    pub fn reset(&mut self) {
        self.clear_active();
        self.last_completed = None;
        self.held_back.clear();
    }

    /// Decode a raw datagram and feed it to the buffer
    ///
    /// Malformed datagrams and rejected fragments are logged at debug level and
    /// reported as [`ProcessResult::Skipped`]; they never touch the active frame.
    pub fn process_datagram(&mut self, datagram: &[u8]) -> ProcessResult {
        let (header, payload) = match fragment_header::decode(datagram) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.datagrams_malformed += 1;
                log::debug!("Dropping datagram: {}", e);
                return ProcessResult::Skipped;
            }
        };

        match self.accept(header, payload) {
            Ok(Accepted::Complete(frame)) => ProcessResult::Frame(frame),
            Ok(Accepted::Pending) => ProcessResult::Accumulating,
            Err(e) => {
                log::debug!("Dropping fragment: {}", e);
                ProcessResult::Skipped
            }
        }
    }

    /// Record one fragment
    ///
    /// A fragment for a different frame than the active one abandons the
    /// active frame. Duplicate indices overwrite the earlier payload. The
    /// fragment count is latched from the first fragment of each frame.
    ///
    /// An idle buffer starts a frame for any id. While a newer frame is
    /// active, fragments repeating the last completed frame (same id and
    /// count) are held back rather than abandoning it; should every index of
    /// that frame arrive again, it is handed out as a complete frame.
    ///
    /// # Errors
    ///
    /// - [`ReassemblyError::IndexOutOfRange`] if `fragment_index >= fragment_count`
    /// - [`ReassemblyError::StaleFragment`] for late fragments held back
    /// - [`ReassemblyError::CountMismatch`] if the count disagrees with the active frame
    /// - [`ReassemblyError::MissingFragment`] if assembly finds a gap (internal invariant)
    ///
    /// Rejected fragments leave the active frame untouched.
    pub fn accept(
        &mut self,
        header: FragmentHeader,
        payload: &[u8],
    ) -> Result<Accepted, ReassemblyError> {
        let FragmentHeader {
            frame_id,
            fragment_index: index,
            fragment_count: count,
        } = header;

        if index >= count {
            self.stats.fragments_rejected += 1;
            return Err(ReassemblyError::IndexOutOfRange {
                frame_id,
                index,
                count,
            });
        }

        if self.is_late_for_completed(frame_id, count) {
            return self.hold_back(frame_id, index, count, payload);
        }

        match self.active_frame_id {
            Some(active) if active == frame_id => {
                if count != self.expected_count {
                    self.stats.fragments_rejected += 1;
                    return Err(ReassemblyError::CountMismatch {
                        frame_id,
                        index,
                        expected: self.expected_count,
                        declared: count,
                    });
                }
            }
            Some(active) => {
                log::debug!(
                    "Abandoning frame {} with {}/{} fragments (frame {} started)",
                    active,
                    self.fragments.len(),
                    self.expected_count,
                    frame_id
                );
                self.stats.frames_abandoned += 1;
                self.start_frame(frame_id, count);
            }
            None => self.start_frame(frame_id, count),
        }

        self.fragments.insert(index, payload.to_vec());
        self.stats.fragments_accepted += 1;

        if self.fragments.len() < usize::from(self.expected_count) {
            return Ok(Accepted::Pending);
        }

        let frame = self.take_frame(frame_id)?;
        self.stats.frames_completed += 1;
        self.last_completed = Some((frame_id, count));
        self.held_back.clear();
        Ok(Accepted::Complete(frame))
    }

    fn is_late_for_completed(&self, frame_id: u16, count: u16) -> bool {
        self.last_completed == Some((frame_id, count))
            && self
                .active_frame_id
                .is_some_and(|active| active != frame_id)
    }

    fn hold_back(
        &mut self,
        frame_id: u16,
        index: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<Accepted, ReassemblyError> {
        self.held_back.insert(index, payload.to_vec());
        if self.held_back.len() < usize::from(count) {
            self.stats.fragments_rejected += 1;
            return Err(ReassemblyError::StaleFragment { frame_id, index });
        }

        log::debug!(
            "Frame {} arrived again in full while frame {:?} is active",
            frame_id,
            self.active_frame_id
        );
        let frame = assemble(frame_id, count, std::mem::take(&mut self.held_back))?;
        self.stats.frames_completed += 1;
        Ok(Accepted::Complete(frame))
    }

    fn start_frame(&mut self, frame_id: u16, count: u16) {
        self.held_back.clear();
        self.fragments.clear();
        self.active_frame_id = Some(frame_id);
        self.expected_count = count;
    }

    fn clear_active(&mut self) {
        self.fragments.clear();
        self.active_frame_id = None;
        self.expected_count = 0;
    }

    /// Concatenate the collected payloads and reset to idle
    fn take_frame(&mut self, frame_id: u16) -> Result<CompletedFrame, ReassemblyError> {
        let count = self.expected_count;
        let fragments = std::mem::take(&mut self.fragments);
        self.clear_active();
        assemble(frame_id, count, fragments)
    }
}

fn assemble(
    frame_id: u16,
    count: u16,
    fragments: BTreeMap<u16, Vec<u8>>,
) -> Result<CompletedFrame, ReassemblyError> {
    let total_len = fragments.values().map(Vec::len).sum();
    let mut data = Vec::with_capacity(total_len);

    // BTreeMap iterates in index order, so any gap shows up as a mismatch
    for (expected, (index, payload)) in (0..count).zip(fragments) {
        if index != expected {
            return Err(ReassemblyError::MissingFragment {
                frame_id,
                index: expected,
                count,
            });
        }
        data.extend_from_slice(&payload);
    }

    log::trace!(
        "Reassembled frame {}: {} fragments, {} bytes",
        frame_id,
        count,
        data.len()
    );

    Ok(CompletedFrame { frame_id, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fragment(frame_id: u16, index: u16, count: u16) -> FragmentHeader {
        FragmentHeader::new(frame_id, index, count)
    }

    fn datagram(frame_id: u16, index: u16, count: u16, payload: &[u8]) -> Vec<u8> {
        let mut data = fragment(frame_id, index, count).to_bytes().to_vec();
        data.extend_from_slice(payload);
        data
    }

    // =========================================================================
    // Basic state machine
    // =========================================================================

    #[test]
    fn test_buffer_starts_idle() {
        let buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.active_frame_id(), None);
        assert_eq!(buffer.expected_count(), 0);
        assert_eq!(buffer.fragments_collected(), 0);
        assert_eq!(buffer.stats(), ReassemblyStats::default());
    }

    #[test]
    fn test_out_of_order_fragments_complete_in_index_order() {
        let mut buffer = ReassemblyBuffer::new();

        assert_eq!(buffer.accept(fragment(7, 1, 3), b"BB"), Ok(Accepted::Pending));
        assert_eq!(buffer.active_frame_id(), Some(7));
        assert_eq!(buffer.accept(fragment(7, 0, 3), b"AA"), Ok(Accepted::Pending));

        let result = buffer.accept(fragment(7, 2, 3), b"CC").unwrap();
        assert_eq!(
            result,
            Accepted::Complete(CompletedFrame {
                frame_id: 7,
                data: b"AABBCC".to_vec(),
            })
        );

        // Completion returns the buffer to idle
        assert_eq!(buffer.active_frame_id(), None);
        assert_eq!(buffer.fragments_collected(), 0);
        assert_eq!(buffer.stats().frames_completed, 1);
    }

    #[test]
    fn test_single_fragment_frame_completes_immediately() {
        let mut buffer = ReassemblyBuffer::new();
        let result = buffer.accept(fragment(3, 0, 1), b"only").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"only"));
    }

    #[test]
    fn test_empty_payloads_are_valid_fragments() {
        let mut buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.accept(fragment(1, 0, 2), b""), Ok(Accepted::Pending));
        let result = buffer.accept(fragment(1, 1, 2), b"x").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"x"));
    }

    #[test]
    fn test_new_frame_id_abandons_incomplete_frame() {
        let mut buffer = ReassemblyBuffer::new();

        assert_eq!(buffer.accept(fragment(1, 0, 2), b"X"), Ok(Accepted::Pending));
        let result = buffer.accept(fragment(2, 0, 1), b"Y").unwrap();

        assert_eq!(
            result,
            Accepted::Complete(CompletedFrame {
                frame_id: 2,
                data: b"Y".to_vec(),
            })
        );
        assert_eq!(buffer.stats().frames_abandoned, 1);
        assert_eq!(buffer.stats().frames_completed, 1);
    }

    #[test]
    fn test_abandoned_fragments_do_not_leak_into_next_frame() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(10, 0, 2), b"old0").unwrap();
        buffer.accept(fragment(11, 1, 2), b"new1").unwrap();
        assert_eq!(buffer.fragments_collected(), 1);

        // The old frame's index 0 must not satisfy the new frame
        let result = buffer.accept(fragment(11, 0, 2), b"new0").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"new0new1"));
    }

    #[test]
    fn test_returning_to_abandoned_frame_starts_over() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(1, 0, 2), b"A").unwrap();
        buffer.accept(fragment(2, 0, 2), b"B").unwrap();
        // Frame 1 comes back: its earlier fragment is gone
        assert_eq!(buffer.accept(fragment(1, 1, 2), b"A2"), Ok(Accepted::Pending));
        assert_eq!(buffer.fragments_collected(), 1);
        assert_eq!(buffer.stats().frames_abandoned, 2);
    }

    #[test]
    fn test_frame_id_wraparound_is_just_another_id() {
        let mut buffer = ReassemblyBuffer::new();

        let first = buffer.accept(fragment(u16::MAX, 0, 1), b"a").unwrap();
        assert!(matches!(first, Accepted::Complete(f) if f.frame_id == u16::MAX));

        let second = buffer.accept(fragment(0, 0, 1), b"b").unwrap();
        assert!(matches!(second, Accepted::Complete(f) if f.frame_id == 0));
    }

    // =========================================================================
    // Duplicates
    // =========================================================================

    #[test]
    fn test_identical_duplicate_does_not_change_result() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(5, 0, 2), b"AA").unwrap();
        buffer.accept(fragment(5, 0, 2), b"AA").unwrap();
        assert_eq!(buffer.fragments_collected(), 1);

        let result = buffer.accept(fragment(5, 1, 2), b"BB").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"AABB"));
    }

    #[test]
    fn test_conflicting_duplicate_last_write_wins() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(5, 0, 2), b"old").unwrap();
        buffer.accept(fragment(5, 0, 2), b"new").unwrap();

        let result = buffer.accept(fragment(5, 1, 2), b"!").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"new!"));
    }

    #[test]
    fn test_duplicates_never_complete_a_frame_early() {
        let mut buffer = ReassemblyBuffer::new();

        for _ in 0..5 {
            assert_eq!(buffer.accept(fragment(9, 0, 3), b"a"), Ok(Accepted::Pending));
        }
        assert_eq!(buffer.accept(fragment(9, 2, 3), b"c"), Ok(Accepted::Pending));
        assert_eq!(buffer.fragments_collected(), 2);
    }

    #[test]
    fn test_idle_buffer_accepts_id_of_completed_frame() {
        let mut buffer = ReassemblyBuffer::new();

        // Sender restarted and reuses the id it sent last
        buffer.accept(fragment(0, 0, 1), b"done").unwrap();
        assert_eq!(buffer.accept(fragment(0, 0, 2), b"new0"), Ok(Accepted::Pending));
        assert_eq!(buffer.active_frame_id(), Some(0));

        let result = buffer.accept(fragment(0, 1, 2), b"new1").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"new0new1"));
        assert_eq!(buffer.stats().frames_completed, 2);
        assert_eq!(buffer.stats().fragments_rejected, 0);
    }

    #[test]
    fn test_same_frame_repeated_while_idle_completes_again() {
        let mut buffer = ReassemblyBuffer::new();

        for _ in 0..5 {
            let result = buffer.accept(fragment(4, 0, 1), b"loop").unwrap();
            assert!(matches!(result, Accepted::Complete(f) if f.frame_id == 4));
        }
        assert_eq!(buffer.stats().frames_completed, 5);
        assert_eq!(buffer.stats().fragments_rejected, 0);
    }

    #[test]
    fn test_late_fragment_does_not_abandon_next_frame() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(4, 0, 2), b"d").unwrap();
        buffer.accept(fragment(4, 1, 2), b"one").unwrap();
        buffer.accept(fragment(5, 0, 2), b"a").unwrap();

        assert_eq!(
            buffer.accept(fragment(4, 1, 2), b"one"),
            Err(ReassemblyError::StaleFragment {
                frame_id: 4,
                index: 1
            })
        );
        assert_eq!(buffer.active_frame_id(), Some(5));
        assert_eq!(buffer.fragments_collected(), 1);
        assert_eq!(buffer.stats().frames_abandoned, 0);

        let result = buffer.accept(fragment(5, 1, 2), b"b").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"ab"));
    }

    #[test]
    fn test_full_resend_of_completed_frame_is_not_lost() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(4, 0, 2), b"o").unwrap();
        buffer.accept(fragment(4, 1, 2), b"ld").unwrap();
        buffer.accept(fragment(5, 0, 3), b"x").unwrap();

        assert!(buffer.accept(fragment(4, 0, 2), b"ne").is_err());
        let result = buffer.accept(fragment(4, 1, 2), b"w").unwrap();
        assert_eq!(
            result,
            Accepted::Complete(CompletedFrame {
                frame_id: 4,
                data: b"new".to_vec(),
            })
        );

        // The newer frame carries on untouched
        assert_eq!(buffer.active_frame_id(), Some(5));
        assert_eq!(buffer.fragments_collected(), 1);
        buffer.accept(fragment(5, 1, 3), b"y").unwrap();
        let result = buffer.accept(fragment(5, 2, 3), b"z").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"xyz"));
    }

    #[test]
    fn test_different_count_for_completed_id_is_a_new_frame() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(4, 0, 1), b"done").unwrap();
        buffer.accept(fragment(5, 0, 2), b"a").unwrap();

        assert_eq!(buffer.accept(fragment(4, 0, 3), b"n"), Ok(Accepted::Pending));
        assert_eq!(buffer.active_frame_id(), Some(4));
        assert_eq!(buffer.stats().frames_abandoned, 1);
    }

    #[test]
    fn test_held_back_fragments_dropped_when_newer_frame_starts() {
        let mut buffer = ReassemblyBuffer::new();

        buffer.accept(fragment(4, 0, 2), b"a").unwrap();
        buffer.accept(fragment(4, 1, 2), b"b").unwrap();
        buffer.accept(fragment(5, 0, 2), b"x").unwrap();
        assert!(buffer.accept(fragment(4, 0, 2), b"a").is_err());

        buffer.accept(fragment(6, 0, 2), b"y").unwrap();
        assert!(buffer.accept(fragment(4, 1, 2), b"b").is_err());
        assert_eq!(buffer.stats().frames_completed, 1);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_index_out_of_range_rejected_without_mutation() {
        let mut buffer = ReassemblyBuffer::new();
        buffer.accept(fragment(1, 0, 2), b"a").unwrap();

        let err = buffer.accept(fragment(2, 2, 2), b"zz").unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::IndexOutOfRange {
                frame_id: 2,
                index: 2,
                count: 2
            }
        );

        // Active frame untouched, not abandoned
        assert_eq!(buffer.active_frame_id(), Some(1));
        assert_eq!(buffer.fragments_collected(), 1);
        assert_eq!(buffer.stats().frames_abandoned, 0);
        assert_eq!(buffer.stats().fragments_rejected, 1);
    }

    #[test]
    fn test_zero_fragment_count_rejected() {
        let mut buffer = ReassemblyBuffer::new();
        assert!(matches!(
            buffer.accept(fragment(1, 0, 0), b""),
            Err(ReassemblyError::IndexOutOfRange { count: 0, .. })
        ));
        assert_eq!(buffer.active_frame_id(), None);
    }

    #[test]
    fn test_count_latched_from_first_fragment() {
        let mut buffer = ReassemblyBuffer::new();
        buffer.accept(fragment(8, 0, 3), b"a").unwrap();

        let err = buffer.accept(fragment(8, 1, 2), b"b").unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::CountMismatch {
                frame_id: 8,
                index: 1,
                expected: 3,
                declared: 2
            }
        );
        assert_eq!(buffer.expected_count(), 3);
        assert_eq!(buffer.fragments_collected(), 1);

        buffer.accept(fragment(8, 1, 3), b"b").unwrap();
        let result = buffer.accept(fragment(8, 2, 3), b"c").unwrap();
        assert!(matches!(result, Accepted::Complete(f) if f.data == b"abc"));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut buffer = ReassemblyBuffer::new();
        buffer.accept(fragment(1, 0, 2), b"a").unwrap();
        buffer.accept(fragment(1, 1, 2), b"b").unwrap();
        buffer.accept(fragment(2, 0, 3), b"c").unwrap();

        buffer.reset();

        assert_eq!(buffer.active_frame_id(), None);
        assert_eq!(buffer.fragments_collected(), 0);

        // Frame 1 no longer counts as completed, so it may replace frame 2
        buffer.accept(fragment(2, 0, 3), b"c").unwrap();
        assert_eq!(buffer.accept(fragment(1, 0, 2), b"a"), Ok(Accepted::Pending));
        assert_eq!(buffer.active_frame_id(), Some(1));
    }

    // =========================================================================
    // Datagram processing
    // =========================================================================

    #[test]
    fn test_process_datagram_scenario() {
        let mut buffer = ReassemblyBuffer::new();

        assert_eq!(
            buffer.process_datagram(&datagram(7, 1, 3, b"BB")),
            ProcessResult::Accumulating
        );
        assert_eq!(
            buffer.process_datagram(&datagram(7, 0, 3, b"AA")),
            ProcessResult::Accumulating
        );
        assert_eq!(
            buffer.process_datagram(&datagram(7, 2, 3, b"CC")),
            ProcessResult::Frame(CompletedFrame {
                frame_id: 7,
                data: b"AABBCC".to_vec(),
            })
        );
    }

    #[test]
    fn test_malformed_datagram_never_mutates_state() {
        let mut buffer = ReassemblyBuffer::new();
        buffer.process_datagram(&datagram(3, 0, 2, b"keep"));

        for len in 0..6 {
            let short = vec![0u8; len];
            assert_eq!(buffer.process_datagram(&short), ProcessResult::Skipped);
        }

        assert_eq!(buffer.active_frame_id(), Some(3));
        assert_eq!(buffer.fragments_collected(), 1);
        assert_eq!(buffer.stats().datagrams_malformed, 6);
        assert_eq!(buffer.stats().frames_abandoned, 0);
    }

    #[test]
    fn test_rejected_fragment_is_skipped() {
        let mut buffer = ReassemblyBuffer::new();
        assert_eq!(
            buffer.process_datagram(&datagram(1, 4, 4, b"x")),
            ProcessResult::Skipped
        );
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Payloads for one frame plus a random arrival order
    fn frame_and_order() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<usize>)> {
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 1..32).prop_flat_map(
            |payloads| {
                let order: Vec<usize> = (0..payloads.len()).collect();
                (Just(payloads), Just(order).prop_shuffle())
            },
        )
    }

    proptest! {
        #[test]
        fn prop_any_arrival_order_yields_ordered_concatenation(
            (payloads, order) in frame_and_order(),
            frame_id in any::<u16>(),
        ) {
            let count = payloads.len() as u16;
            let mut buffer = ReassemblyBuffer::new();
            let mut completed = Vec::new();

            for &i in &order {
                if let Accepted::Complete(frame) =
                    buffer.accept(fragment(frame_id, i as u16, count), &payloads[i]).unwrap()
                {
                    completed.push(frame);
                }
            }

            prop_assert_eq!(completed.len(), 1);
            prop_assert_eq!(&completed[0].data, &payloads.concat());
            prop_assert_eq!(completed[0].frame_id, frame_id);
        }

        #[test]
        fn prop_identical_duplicates_before_completion_are_harmless(
            (payloads, order) in frame_and_order(),
            dups in prop::collection::vec(any::<usize>(), 0..16),
        ) {
            let n = payloads.len();
            let count = n as u16;
            let mut buffer = ReassemblyBuffer::new();

            for &i in &order[..n - 1] {
                prop_assert_eq!(
                    buffer.accept(fragment(1, i as u16, count), &payloads[i]).unwrap(),
                    Accepted::Pending
                );
            }
            if n > 1 {
                for d in dups {
                    let i = order[d % (n - 1)];
                    prop_assert_eq!(
                        buffer.accept(fragment(1, i as u16, count), &payloads[i]).unwrap(),
                        Accepted::Pending
                    );
                }
            }
            prop_assert_eq!(buffer.fragments_collected(), n - 1);

            let last = order[n - 1];
            let result = buffer.accept(fragment(1, last as u16, count), &payloads[last]).unwrap();
            prop_assert_eq!(
                result,
                Accepted::Complete(CompletedFrame { frame_id: 1, data: payloads.concat() })
            );
        }

        #[test]
        fn prop_incomplete_frame_never_completes(
            (payloads, order) in frame_and_order(),
            missing in any::<usize>(),
        ) {
            let count = payloads.len() as u16;
            let skip = order[missing % order.len()];
            let mut buffer = ReassemblyBuffer::new();

            for &i in order.iter().filter(|&&i| i != skip) {
                prop_assert_eq!(
                    buffer.accept(fragment(2, i as u16, count), &payloads[i]).unwrap(),
                    Accepted::Pending
                );
            }
            prop_assert_eq!(buffer.stats().frames_completed, 0);
        }
    }
}
