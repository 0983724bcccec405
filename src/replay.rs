//! Datagram replay for testing without a live sender.
//!
//! Replays a capture written by [`crate::capture::CaptureWriter`] as a
//! [`DatagramSource`], so the receiver runs exactly as it would against the
//! network, with the recorded timing optionally compressed or stretched.
//!
//! # File Format
//!
//! ```text
//! [u64 LE: timestamp_us][u32 LE: length][data bytes]...
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use udpcam_lib::replay::{CaptureReplay, ReplayConfig};
//!
//! let replay = CaptureReplay::load_with_config(
//!     Path::new("session.bin"),
//!     ReplayConfig { speed: 2.0, ..Default::default() },
//! )?;
//!
//! // Feed it to a FrameReceiver in place of a UdpTransport
//! let receiver = FrameReceiver::new(replay, pipeline, 1200);
//! ```

use std::io::{self, Read};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::capture::{metadata_path_for, read_metadata, CaptureMetadata, RECORD_HEADER_LEN};
use crate::reassembly::{CompletedFrame, ProcessResult, ReassemblyBuffer};
use crate::transport::{DatagramSource, RecvOutcome};

/// Largest datagram a capture record may hold.
pub const MAX_RECORD_LEN: usize = 64 * 1024;

/// Longest single sleep while waiting for the next datagram; the remainder is
/// reported as a timeout so the receiver can check its stop signal.
const MAX_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Errors that can occur during replay operations.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// File not found or cannot be opened.
    #[error("failed to open file: {0}")]
    FileOpen(#[from] io::Error),

    /// Invalid or corrupted record in the capture file.
    #[error("invalid record at offset {offset}: {message}")]
    InvalidRecord {
        /// Byte offset in the capture file where the record starts.
        offset: u64,
        /// Description of the error.
        message: String,
    },
}

/// Result type alias for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

/// A single captured datagram with timing information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayDatagram {
    /// Timestamp relative to capture start (microseconds).
    pub timestamp_us: u64,
    /// Raw datagram bytes.
    pub data: Vec<u8>,
}

/// Configuration for replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Playback speed multiplier (1.0 = realtime, 2.0 = 2x speed, 0.0 = as fast as possible).
    pub speed: f64,
    /// Whether to start over when reaching the end.
    pub loop_playback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            loop_playback: false,
        }
    }
}

/// Replays captured datagrams as a [`DatagramSource`].
pub struct CaptureReplay {
    /// Loaded datagrams ready for replay.
    datagrams: Vec<ReplayDatagram>,
    /// Optional metadata from the capture session.
    metadata: Option<CaptureMetadata>,
    /// Replay configuration.
    config: ReplayConfig,
    /// Index of the next datagram to deliver.
    position: usize,
    /// When the current pass started (set on the first receive).
    started: Option<Instant>,
}

impl CaptureReplay {
    /// Load captured datagrams from a binary file.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::FileOpen` if the file cannot be opened.
    /// Returns `ReplayError::InvalidRecord` if a record length is corrupted.
    pub fn load(path: &Path) -> Result<Self> {
        let datagrams = read_records(path)?;
        let metadata = try_load_metadata(path);

        log::info!(
            "Loaded {} datagrams from {}",
            datagrams.len(),
            path.display()
        );

        if let Some(ref meta) = metadata {
            log::info!(
                "Metadata: bind {}, {} frames, {} ms{}",
                meta.bind,
                meta.total_frames,
                meta.duration_ms,
                if meta.description.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", meta.description)
                }
            );
        }

        Ok(Self::from_datagrams(datagrams, metadata))
    }

    /// Load datagrams with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or contains invalid records.
    pub fn load_with_config(path: &Path, config: ReplayConfig) -> Result<Self> {
        let mut replay = Self::load(path)?;
        replay.config = config;
        Ok(replay)
    }

    /// Build a replay from datagrams already in memory.
    pub fn from_datagrams(
        datagrams: Vec<ReplayDatagram>,
        metadata: Option<CaptureMetadata>,
    ) -> Self {
        Self {
            datagrams,
            metadata,
            config: ReplayConfig::default(),
            position: 0,
            started: None,
        }
    }

    /// Get the loaded metadata, if available.
    #[must_use]
    pub fn metadata(&self) -> Option<&CaptureMetadata> {
        self.metadata.as_ref()
    }

    /// Get the number of loaded datagrams.
    #[must_use]
    pub fn datagram_count(&self) -> usize {
        self.datagrams.len()
    }

    /// Get the total duration of the capture in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.datagrams
            .last()
            .map(|d| d.timestamp_us / 1000)
            .unwrap_or(0)
    }

    /// Set the replay configuration.
    pub fn set_config(&mut self, config: ReplayConfig) {
        self.config = config;
    }

    /// Time still to wait before a datagram stamped `timestamp_us` is due.
    fn time_until_due(&mut self, timestamp_us: u64) -> Duration {
        if self.config.speed <= 0.0 {
            return Duration::ZERO;
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        let due = Duration::from_micros((timestamp_us as f64 / self.config.speed) as u64);
        due.saturating_sub(started.elapsed())
    }
}

impl DatagramSource for CaptureReplay {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<RecvOutcome> {
        if self.position >= self.datagrams.len() {
            if !self.config.loop_playback || self.datagrams.is_empty() {
                return Ok(RecvOutcome::Closed);
            }
            log::debug!("Replay loop completed, restarting");
            self.position = 0;
            self.started = None;
            return Ok(RecvOutcome::Rewound);
        }

        let timestamp_us = self.datagrams[self.position].timestamp_us;
        let wait = self.time_until_due(timestamp_us);
        if wait > MAX_WAIT_SLICE {
            thread::sleep(MAX_WAIT_SLICE);
            return Ok(RecvOutcome::Timeout);
        }
        if wait > Duration::ZERO {
            thread::sleep(wait);
        }

        let data = &self.datagrams[self.position].data;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        self.position += 1;

        Ok(RecvOutcome::Datagram(len))
    }
}

/// Read all records from a capture file.
///
/// A capture cut short mid-record (the writer died or hit a full disk) keeps
/// every complete record; the partial tail is dropped with a warning.
///
/// # Errors
///
/// Returns `ReplayError::FileOpen` if the file cannot be read.
/// Returns `ReplayError::InvalidRecord` for records longer than [`MAX_RECORD_LEN`].
pub fn read_records(path: &Path) -> Result<Vec<ReplayDatagram>> {
    let mut file = io::BufReader::new(std::fs::File::open(path)?);
    let mut datagrams = Vec::new();
    let mut offset = 0u64;

    loop {
        // Timestamp (8 bytes) and datagram length (4 bytes)
        let mut header = [0u8; RECORD_HEADER_LEN];
        match read_full(&mut file, &mut header)? {
            0 => break,
            RECORD_HEADER_LEN => {}
            n => {
                log::warn!(
                    "Capture ends mid-record at offset {} ({} of {} header bytes), ignoring tail",
                    offset,
                    n,
                    RECORD_HEADER_LEN
                );
                break;
            }
        }
        let mut timestamp_bytes = [0u8; 8];
        let mut len_bytes = [0u8; 4];
        timestamp_bytes.copy_from_slice(&header[..8]);
        len_bytes.copy_from_slice(&header[8..]);
        let timestamp_us = u64::from_le_bytes(timestamp_bytes);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_RECORD_LEN {
            return Err(ReplayError::InvalidRecord {
                offset,
                message: format!("record length {} exceeds {} byte limit", len, MAX_RECORD_LEN),
            });
        }

        let mut data = vec![0u8; len];
        let got = read_full(&mut file, &mut data)?;
        if got < len {
            log::warn!(
                "Capture ends mid-record at offset {} ({} of {} data bytes), ignoring tail",
                offset,
                got,
                len
            );
            break;
        }

        datagrams.push(ReplayDatagram { timestamp_us, data });
        offset += (RECORD_HEADER_LEN + len) as u64;
    }

    Ok(datagrams)
}

/// Fill `buf` as far as the reader allows, returning the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Try to load metadata from the companion JSON file.
fn try_load_metadata(path: &Path) -> Option<CaptureMetadata> {
    let json_path = metadata_path_for(path);
    if !json_path.exists() {
        return None;
    }
    match read_metadata(&json_path) {
        Ok(meta) => Some(meta),
        Err(e) => {
            log::warn!("Ignoring metadata {}: {}", json_path.display(), e);
            None
        }
    }
}

/// Synchronous replay for simple use cases.
///
/// Feeds every datagram through a fresh [`ReassemblyBuffer`] without timing
/// and returns the completed frames.
///
/// # Errors
///
/// Returns `ReplayError` if the file cannot be loaded or contains invalid data.
///
/// # Example
///
/// ```rust,ignore
/// let frames = replay_all_frames(Path::new("session.bin"))?;
/// println!("Replayed {} frames", frames.len());
/// ```
pub fn replay_all_frames(path: &Path) -> Result<Vec<CompletedFrame>> {
    Ok(FrameIterator::new(path)?.collect())
}

/// Replay datagrams and return frames via an iterator.
///
/// This is a lazy iterator that reassembles on demand.
pub struct FrameIterator {
    datagrams: std::vec::IntoIter<ReplayDatagram>,
    buffer: ReassemblyBuffer,
}

impl FrameIterator {
    /// Create a new frame iterator from a capture file.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError` if the file cannot be loaded.
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            datagrams: read_records(path)?.into_iter(),
            buffer: ReassemblyBuffer::new(),
        })
    }

    /// Reassembly counters so far.
    pub fn stats(&self) -> crate::reassembly::ReassemblyStats {
        self.buffer.stats()
    }
}

impl Iterator for FrameIterator {
    type Item = CompletedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let datagram = self.datagrams.next()?;
            if let ProcessResult::Frame(frame) = self.buffer.process_datagram(&datagram.data) {
                return Some(frame);
            }
        }
    }
}
