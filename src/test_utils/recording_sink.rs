//! In-memory sink that records every frame it is sent

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::sink::{FrameSink, SinkError, SinkFormat};

/// Everything a [`RecordingSink`] has seen
#[derive(Debug, Default)]
pub struct SinkLog {
    /// Frames accepted, in order
    pub frames: Vec<Vec<u8>>,
    /// Number of times `close` was called
    pub close_count: u32,
}

/// Sink that keeps frames in memory and never paces
///
/// The log is shared, so a test can keep a handle after the sink has been
/// moved into a pipeline or receiver.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    format: SinkFormat,
    log: Arc<Mutex<SinkLog>>,
    /// Fail the next `send` with an I/O error
    pub fail_next_send: bool,
}

impl RecordingSink {
    /// Create an empty recording sink
    pub fn new(format: SinkFormat) -> Self {
        Self {
            format,
            log: Arc::new(Mutex::new(SinkLog::default())),
            fail_next_send: false,
        }
    }

    /// Shared handle to the log
    pub fn log(&self) -> Arc<Mutex<SinkLog>> {
        Arc::clone(&self.log)
    }

    fn lock(&self) -> MutexGuard<'_, SinkLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the frames received so far
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Number of times the sink was closed
    pub fn close_count(&self) -> u32 {
        self.lock().close_count
    }
}

impl FrameSink for RecordingSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if self.fail_next_send {
            self.fail_next_send = false;
            return Err(SinkError::Io(std::io::Error::other("injected send failure")));
        }

        let expected = self.format.frame_size();
        if frame.len() != expected {
            return Err(SinkError::FrameSize {
                actual: frame.len(),
                expected,
            });
        }

        let mut log = self.lock();
        if log.close_count > 0 {
            return Err(SinkError::Closed);
        }
        log.frames.push(frame.to_vec());
        Ok(())
    }

    fn time_until_next_frame(&self) -> Duration {
        Duration::ZERO
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.lock().close_count += 1;
        Ok(())
    }
}
