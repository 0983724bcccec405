//! Frame assembler loop
//!
//! One thread does everything: receive a datagram, feed it to the
//! [`ReassemblyBuffer`], and when a frame completes, present it synchronously
//! before receiving again. While a frame is being presented no datagrams are
//! read; the socket buffer absorbs them or they are lost.
//!
//! ```text
//! DatagramSource → ReassemblyBuffer → PresentPipeline → FrameSink
//!        └──────→ CaptureWriter (optional)
//! ```

use std::io;

use thiserror::Error;

use crate::capture::CaptureWriter;
use crate::pipeline::{PipelineStats, PresentPipeline};
use crate::reassembly::{CompletedFrame, ProcessResult, ReassemblyBuffer, ReassemblyStats};
use crate::sink::FrameSink;
use crate::stop::StopSignal;
use crate::transport::{DatagramSource, RecvOutcome};

/// Default number of completed frames between stats log lines
pub const DEFAULT_STATS_INTERVAL: u64 = 300;

/// Fatal receiver failures
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// The datagram source failed in a way that cannot be retried.
    #[error("transport receive failed: {0}")]
    Transport(#[from] io::Error),
}

/// Counters for a receiver run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Datagrams read from the source
    pub datagrams_received: u64,
    /// Reassembly counters
    pub reassembly: ReassemblyStats,
    /// Presentation counters
    pub pipeline: PipelineStats,
}

/// Receive loop owning the source, the reassembly state and the pipeline
pub struct FrameReceiver<S: DatagramSource, K: FrameSink> {
    source: S,
    buffer: ReassemblyBuffer,
    pipeline: PresentPipeline<K>,
    capture: Option<CaptureWriter>,
    recv_buf: Vec<u8>,
    datagrams_received: u64,
    stats_interval: u64,
}

impl<S: DatagramSource, K: FrameSink> FrameReceiver<S, K> {
    /// Create a receiver reading datagrams of up to `max_datagram_size` bytes
    pub fn new(source: S, pipeline: PresentPipeline<K>, max_datagram_size: usize) -> Self {
        Self {
            source,
            buffer: ReassemblyBuffer::new(),
            pipeline,
            capture: None,
            recv_buf: vec![0u8; max_datagram_size],
            datagrams_received: 0,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }

    /// Record every received datagram to `capture`
    pub fn with_capture(mut self, capture: CaptureWriter) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Log a stats summary every `interval` completed frames (0 disables)
    pub fn with_stats_interval(mut self, interval: u64) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Counters so far
    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            datagrams_received: self.datagrams_received,
            reassembly: self.buffer.stats(),
            pipeline: self.pipeline.stats(),
        }
    }

    /// Run until `stop` is raised or the source closes
    ///
    /// The capture is finished and the sink closed on every exit; the source
    /// is released when the receiver is dropped at the end of this call.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Transport`] if the source fails fatally.
    pub fn run(mut self, stop: &StopSignal) -> Result<ReceiverStats, ReceiverError> {
        log::info!("Receiver loop started");

        let result = self.receive_until_stopped(stop);
        if let Err(e) = &result {
            log::error!("Receiver loop failed: {}", e);
        }

        self.shutdown();
        let stats = self.stats();
        log_summary("Receiver stopped", &stats);

        result.map(|()| stats)
    }

    fn receive_until_stopped(&mut self, stop: &StopSignal) -> Result<(), ReceiverError> {
        while !stop.is_stopped() {
            match self.source.recv(&mut self.recv_buf)? {
                RecvOutcome::Datagram(len) => self.handle_datagram(len),
                RecvOutcome::Timeout => {}
                RecvOutcome::Rewound => {
                    log::debug!("Datagram source rewound, dropping reassembly state");
                    self.buffer.reset();
                }
                RecvOutcome::Closed => {
                    log::info!("Datagram source exhausted");
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_datagram(&mut self, len: usize) {
        self.datagrams_received += 1;
        let datagram = &self.recv_buf[..len];

        let capture_error = match &mut self.capture {
            Some(capture) => capture.record(datagram).err(),
            None => None,
        };
        if let Some(e) = capture_error {
            log::warn!("Capture write failed, disabling capture: {}", e);
            self.capture = None;
        }

        if let ProcessResult::Frame(frame) = self.buffer.process_datagram(datagram) {
            self.present(frame);
        }
    }

    fn present(&mut self, frame: CompletedFrame) {
        if let Some(capture) = &mut self.capture {
            capture.record_frame();
        }

        match self.pipeline.present(&frame.data) {
            Ok(()) => log::trace!("Presented frame {} ({} bytes)", frame.frame_id, frame.data.len()),
            Err(e) => log::warn!("Skipping frame {}: {}", frame.frame_id, e),
        }

        let completed = self.buffer.stats().frames_completed;
        if self.stats_interval > 0 && completed % self.stats_interval == 0 {
            log_summary("Stats", &self.stats());
        }
    }

    fn shutdown(&mut self) {
        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture.finish() {
                log::warn!("Failed to finish capture: {}", e);
            }
        }
        if let Err(e) = self.pipeline.close() {
            log::warn!("Failed to close sink: {}", e);
        }
    }
}

fn log_summary(label: &str, stats: &ReceiverStats) {
    log::info!(
        "{}: {} datagrams, {} frames completed, {} abandoned, {} presented, {} decode failures, {} present failures, {} fragments rejected, {} malformed",
        label,
        stats.datagrams_received,
        stats.reassembly.frames_completed,
        stats.reassembly.frames_abandoned,
        stats.pipeline.frames_presented,
        stats.pipeline.decode_failures,
        stats.pipeline.present_failures,
        stats.reassembly.fragments_rejected,
        stats.reassembly.datagrams_malformed
    );
}
