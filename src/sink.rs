//! Virtual camera sink
//!
//! A sink accepts fixed-size raw frames in one pixel format and paces them at
//! a fixed frame rate. [`RawVideoSink`] writes frames back to back to any
//! writer: stdout (for piping into `ffmpeg`), a regular file, or a
//! v4l2loopback device whose format was configured beforehand, e.g.
//!
//! ```text
//! udpcam | ffmpeg -f rawvideo -pix_fmt rgb24 -s 1280x720 -r 30 -i - -f v4l2 /dev/video10
//! ```

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::color_conversion::PixelFormat;

/// Errors that can occur while writing to a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The output could not be opened.
    #[error("failed to open sink output '{path}': {source}")]
    Open {
        /// Output path as configured.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A frame does not match the sink's fixed frame size.
    #[error("frame is {actual} bytes, sink expects {expected}")]
    FrameSize {
        /// Size of the rejected frame.
        actual: usize,
        /// Size required by the sink format.
        expected: usize,
    },

    /// Writing to the output failed.
    #[error("sink write failed: {0}")]
    Io(#[from] io::Error),

    /// The sink was already closed.
    #[error("sink is closed")]
    Closed,
}

/// Fixed output format of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Output pixel layout
    pub pixel_format: PixelFormat,
    /// Output frame rate
    pub fps: u32,
}

impl SinkFormat {
    /// Bytes per output frame
    pub fn frame_size(&self) -> usize {
        self.pixel_format.frame_size(self.width, self.height)
    }

    /// Time between two frame slots
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Downstream consumer of presented frames
pub trait FrameSink {
    /// Fixed format every frame must be converted to
    fn format(&self) -> SinkFormat;

    /// Send one converted frame
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the frame has the wrong size or cannot be
    /// written.
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError>;

    /// How long to wait before the sink is ready for the next frame
    fn time_until_next_frame(&self) -> Duration;

    /// Release the underlying device. Further sends fail.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if pending output cannot be flushed.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Fixed-rate frame clock
///
/// After each sent frame the next slot is one period later. A frame sent late
/// restarts the cadence from the time it was actually sent.
#[derive(Debug, Clone)]
pub struct FramePacer {
    period: Duration,
    next_slot: Option<Instant>,
}

impl FramePacer {
    /// Create a pacer for the given frame rate (0 is treated as 1 fps)
    pub fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / fps.max(1),
            next_slot: None,
        }
    }

    /// Frame period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Record that a frame was sent at `now`
    pub fn mark_sent(&mut self, now: Instant) {
        let base = match self.next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        self.next_slot = Some(base + self.period);
    }

    /// Time remaining until the next slot, zero if it already passed
    pub fn time_until_next_frame(&self, now: Instant) -> Duration {
        self.next_slot
            .map_or(Duration::ZERO, |slot| slot.saturating_duration_since(now))
    }
}

/// Sink writing raw frames back to back to a writer
pub struct RawVideoSink<W: Write> {
    writer: Option<W>,
    format: SinkFormat,
    pacer: FramePacer,
    frames_sent: u64,
}

impl RawVideoSink<Box<dyn Write + Send>> {
    /// Open a sink on stdout (`-`) or a filesystem path
    ///
    /// Existing devices and FIFOs are opened for writing as they are; regular
    /// files are created or truncated.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Open`] if the output cannot be opened.
    pub fn open(output: &str, format: SinkFormat) -> Result<Self, SinkError> {
        let writer: Box<dyn Write + Send> = if output == "-" {
            Box::new(io::stdout())
        } else {
            let path = Path::new(output);
            let is_special = std::fs::metadata(path)
                .map(|m| !m.file_type().is_file())
                .unwrap_or(false);

            let file = OpenOptions::new()
                .write(true)
                .create(!is_special)
                .truncate(!is_special)
                .open(path)
                .map_err(|source| SinkError::Open {
                    path: output.to_string(),
                    source,
                })?;
            Box::new(file)
        };

        log::info!(
            "Sink opened on {}: {}x{} {} @ {} fps",
            output,
            format.width,
            format.height,
            format.pixel_format.name(),
            format.fps
        );

        Ok(Self::new(writer, format))
    }
}

impl<W: Write> RawVideoSink<W> {
    /// Wrap a writer
    pub fn new(writer: W, format: SinkFormat) -> Self {
        Self {
            writer: Some(writer),
            format,
            pacer: FramePacer::new(format.fps),
            frames_sent: 0,
        }
    }

    /// Number of frames written so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Borrow the writer (None once closed)
    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

impl<W: Write> FrameSink for RawVideoSink<W> {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;

        let expected = self.format.frame_size();
        if frame.len() != expected {
            return Err(SinkError::FrameSize {
                actual: frame.len(),
                expected,
            });
        }

        writer.write_all(frame)?;
        writer.flush()?;

        self.pacer.mark_sent(Instant::now());
        self.frames_sent += 1;
        Ok(())
    }

    fn time_until_next_frame(&self) -> Duration {
        self.pacer.time_until_next_frame(Instant::now())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            log::info!("Sink closed after {} frames", self.frames_sent);
        }
        Ok(())
    }
}

impl<W: Write> Drop for RawVideoSink<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to flush sink on drop: {}", e);
        }
    }
}
