//! Datagram capture for testing and debugging.
//!
//! Records every datagram the receiver sees, with its arrival time, so that a
//! session can be replayed offline (see [`crate::replay`]).
//!
//! # File Format
//!
//! - `<name>.bin`: sequence of `[u64 LE: timestamp_us][u32 LE: length][bytes: data]...`
//!   where the timestamp is relative to the start of the capture
//! - `<name>.json`: [`CaptureMetadata`] written when the capture finishes
//!
//! # Example
//!
//! ```ignore
//! let mut capture = CaptureWriter::create(Path::new("/tmp/session.bin"), CaptureMetadata {
//!     bind: "0.0.0.0:8000".to_string(),
//!     ..Default::default()
//! })?;
//!
//! // In the receive loop:
//! capture.record(&datagram)?;
//!
//! // When done:
//! let result = capture.finish()?;
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Size of the per-record header: timestamp plus length.
pub const RECORD_HEADER_LEN: usize = 12;

/// Errors that can occur during capture operations.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output directory does not exist.
    #[error("output directory does not exist: {0}")]
    DirectoryNotFound(String),
}

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Metadata about a capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// Address the receiver was bound to.
    #[serde(default)]
    pub bind: String,
    /// Receive buffer size in effect during the capture.
    #[serde(default)]
    pub max_datagram_size: usize,
    /// Total number of datagrams captured.
    #[serde(default)]
    pub total_datagrams: u64,
    /// Total number of frames completed while capturing.
    #[serde(default)]
    pub total_frames: u64,
    /// Capture duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Total datagram bytes captured.
    #[serde(default)]
    pub total_bytes: u64,
    /// Optional description or notes about the capture.
    #[serde(default)]
    pub description: String,
}

/// Result returned when a capture finishes successfully.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Path to the datagram file.
    pub datagrams_path: PathBuf,
    /// Path to the metadata JSON file.
    pub metadata_path: PathBuf,
    /// Summary of the capture session.
    pub metadata: CaptureMetadata,
}

/// Path of the metadata file that accompanies a datagram file.
pub fn metadata_path_for(datagrams_path: &Path) -> PathBuf {
    datagrams_path.with_extension("json")
}

/// Streams datagrams to a capture file as they arrive.
pub struct CaptureWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    started: Instant,
    metadata: CaptureMetadata,
}

impl CaptureWriter {
    /// Creates (or truncates) the capture file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::DirectoryNotFound` if the parent directory is
    /// missing, or `CaptureError::Io` if the file cannot be created.
    pub fn create(path: &Path, metadata: CaptureMetadata) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                return Err(CaptureError::DirectoryNotFound(dir.display().to_string()));
            }
        }

        let file = File::create(path)?;
        log::info!("Capturing datagrams to {}", path.display());

        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            started: Instant::now(),
            metadata: CaptureMetadata {
                total_datagrams: 0,
                total_frames: 0,
                duration_ms: 0,
                total_bytes: 0,
                ..metadata
            },
        })
    }

    /// Number of datagrams recorded so far.
    #[must_use]
    pub fn datagram_count(&self) -> u64 {
        self.metadata.total_datagrams
    }

    /// Number of datagram bytes recorded so far.
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.metadata.total_bytes
    }

    /// Appends one datagram to the capture.
    ///
    /// The record goes out in a single write, so a failed write never leaves
    /// a header without its data in the buffer.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Io` if the write fails.
    pub fn record(&mut self, datagram: &[u8]) -> Result<()> {
        let timestamp_us = self.started.elapsed().as_micros() as u64;
        let len = u32::try_from(datagram.len()).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "datagram too large for capture record",
            )
        })?;

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + datagram.len());
        record.extend_from_slice(&timestamp_us.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(datagram);
        self.writer.write_all(&record)?;

        self.metadata.total_datagrams += 1;
        self.metadata.total_bytes += u64::from(len);
        Ok(())
    }

    /// Increments the frame counter in the metadata.
    ///
    /// Call this when a complete frame has been reassembled.
    pub fn record_frame(&mut self) {
        self.metadata.total_frames += 1;
    }

    /// Flushes the datagram file and writes the metadata next to it.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Io` if file operations fail, or
    /// `CaptureError::Json` if metadata serialization fails.
    pub fn finish(mut self) -> Result<CaptureResult> {
        self.writer.flush()?;
        self.metadata.duration_ms = self.started.elapsed().as_millis() as u64;

        let metadata_path = metadata_path_for(&self.path);
        write_metadata(&metadata_path, &self.metadata)?;

        log::info!(
            "Capture finished: {} datagrams, {} bytes, {} frames, {} ms",
            self.metadata.total_datagrams,
            self.metadata.total_bytes,
            self.metadata.total_frames,
            self.metadata.duration_ms
        );

        Ok(CaptureResult {
            datagrams_path: self.path,
            metadata_path,
            metadata: self.metadata,
        })
    }
}

/// Writes capture metadata to a JSON file.
///
/// # Errors
///
/// Returns `CaptureError::Io` if the file cannot be written.
/// Returns `CaptureError::Json` if serialization fails.
pub fn write_metadata(path: &Path, metadata: &CaptureMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(path, json)?;
    log::debug!("Saved metadata to {}", path.display());
    Ok(())
}

/// Reads capture metadata from a JSON file.
///
/// # Errors
///
/// Returns `CaptureError::Io` if the file cannot be read.
/// Returns `CaptureError::Json` if the JSON is invalid.
pub fn read_metadata(path: &Path) -> Result<CaptureMetadata> {
    let json = std::fs::read_to_string(path)?;
    let metadata: CaptureMetadata = serde_json::from_str(&json)?;
    Ok(metadata)
}
