//! Decode and present pipeline
//!
//! Turns a reassembled encoded frame into a raw frame on the sink:
//! ```text
//! bytes → validation → decode → resize → pixel format conversion → sink → pacing
//! ```
//!
//! Each frame succeeds or fails on its own. A failure is reported to the
//! caller and nothing partial ever reaches the sink.

use std::time::Duration;

use image::imageops::{self, FilterType};
use thiserror::Error;

use crate::color_conversion::convert_rgb_frame;
use crate::frame_validation::{validate_encoded_frame, ValidationLevel};
use crate::sink::{FrameSink, SinkError};

/// Per-frame presentation failures
#[derive(Error, Debug)]
pub enum PresentError {
    /// The bytes are not a decodable image.
    #[error("frame decode failed: {0}")]
    DecodeFailed(String),

    /// Resizing, conversion or sending failed.
    #[error("frame present failed: {0}")]
    PresentFailed(String),
}

/// Counters kept by the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames delivered to the sink
    pub frames_presented: u64,
    /// Frames that could not be decoded
    pub decode_failures: u64,
    /// Frames that decoded but could not be delivered
    pub present_failures: u64,
}

/// Adapter from encoded frames to a [`FrameSink`]
pub struct PresentPipeline<K: FrameSink> {
    sink: K,
    validation: ValidationLevel,
    stats: PipelineStats,
}

impl<K: FrameSink> PresentPipeline<K> {
    /// Create a pipeline feeding `sink`
    pub fn new(sink: K, validation: ValidationLevel) -> Self {
        Self {
            sink,
            validation,
            stats: PipelineStats::default(),
        }
    }

    /// Borrow the sink
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Lifetime counters
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Decode `bytes` and deliver the frame to the sink
    ///
    /// On success, blocks until the sink's next frame slot.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::DecodeFailed`] if the bytes fail validation or
    /// decoding and [`PresentError::PresentFailed`] if conversion or the sink
    /// fails. The pipeline stays usable after either.
    pub fn present(&mut self, bytes: &[u8]) -> Result<(), PresentError> {
        let result = self.present_frame(bytes);

        match &result {
            Ok(()) => self.stats.frames_presented += 1,
            Err(PresentError::DecodeFailed(_)) => self.stats.decode_failures += 1,
            Err(PresentError::PresentFailed(_)) => self.stats.present_failures += 1,
        }

        if result.is_ok() {
            let wait = self.sink.time_until_next_frame();
            if wait > Duration::ZERO {
                std::thread::sleep(wait);
            }
        }

        result
    }

    fn present_frame(&mut self, bytes: &[u8]) -> Result<(), PresentError> {
        let validation = validate_encoded_frame(bytes, self.validation);
        if !validation.valid {
            return Err(PresentError::DecodeFailed(
                validation
                    .failure_reason
                    .unwrap_or_else(|| "validation failed".to_string()),
            ));
        }

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PresentError::DecodeFailed(e.to_string()))?
            .to_rgb8();

        let (src_width, src_height) = decoded.dimensions();
        if src_width == 0 || src_height == 0 {
            return Err(PresentError::DecodeFailed(format!(
                "decoded image is empty ({}x{})",
                src_width, src_height
            )));
        }

        let format = self.sink.format();
        let rgb = if (src_width, src_height) == (format.width, format.height) {
            decoded
        } else {
            log::trace!(
                "Resizing {}x{} -> {}x{}",
                src_width,
                src_height,
                format.width,
                format.height
            );
            imageops::resize(&decoded, format.width, format.height, FilterType::Triangle)
        };

        let frame = convert_rgb_frame(rgb.as_raw(), format.width, format.height, format.pixel_format)
            .map_err(|e| PresentError::PresentFailed(e.to_string()))?;

        self.sink
            .send(&frame)
            .map_err(|e| PresentError::PresentFailed(e.to_string()))
    }

    /// Release the sink
    ///
    /// # Errors
    ///
    /// Returns the sink's error if it cannot be closed cleanly.
    pub fn close(&mut self) -> Result<(), SinkError> {
        self.sink.close()
    }
}
