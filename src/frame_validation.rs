//! Pre-decode sanity checks for reassembled frames
//!
//! Catches obviously broken frames before they reach the image decoder:
//! - Unrecognised content (no known image signature)
//! - Truncated JPEG/PNG streams (missing EOI marker / IEND chunk)
//!
//! Configurable via the `UDPCAM_FRAME_VALIDATION` environment variable.

use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// JPEG Start Of Image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG End Of Image marker
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
/// Complete IEND chunk: zero length, type, CRC
const PNG_IEND: [u8; 12] = [
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Frame validation strictness levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Known signature plus a complete JPEG/PNG trailer
    Strict,
    /// Known image signature only
    #[default]
    Minimal,
    /// No validation
    Off,
}

impl ValidationLevel {
    /// Parse from environment variable string
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "strict" => Self::Strict,
            "minimal" => Self::Minimal,
            "off" | "none" | "disabled" => Self::Off,
            _ => {
                log::warn!("Unknown validation level '{}', defaulting to 'minimal'", s);
                Self::Minimal
            }
        }
    }
}

/// Frame validation result with diagnostic details
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the frame passed validation
    pub valid: bool,
    /// Image format detected from the content, if any
    pub format: Option<ImageFormat>,
    /// Frame size in bytes
    pub size: usize,
    /// Reason for validation failure (if any)
    pub failure_reason: Option<String>,
}

/// Check if data starts with JPEG SOI marker (0xFFD8)
#[inline]
pub fn is_jpeg_data(data: &[u8]) -> bool {
    data.starts_with(&JPEG_SOI)
}

/// Check if a JPEG stream ends with the EOI marker
///
/// Trailing zero padding after the marker is tolerated.
fn has_jpeg_trailer(data: &[u8]) -> bool {
    let end = data.iter().rposition(|&b| b != 0x00).map_or(0, |i| i + 1);
    data[..end].ends_with(&JPEG_EOI)
}

/// Validate a reassembled frame before decoding
///
/// # Arguments
/// * `data` - Encoded frame bytes
/// * `level` - Validation strictness level
pub fn validate_encoded_frame(data: &[u8], level: ValidationLevel) -> ValidationResult {
    let size = data.len();

    if level == ValidationLevel::Off {
        return ValidationResult {
            valid: true,
            format: None,
            size,
            failure_reason: None,
        };
    }

    let format = image::guess_format(data).ok();

    let failure_reason = match (format, level) {
        (None, _) => Some(format!(
            "Unrecognised image signature ({} bytes, starts {:02x?})",
            size,
            &data[..size.min(4)]
        )),
        (Some(ImageFormat::Jpeg), ValidationLevel::Strict) if !has_jpeg_trailer(data) => {
            Some("JPEG stream missing EOI marker (truncated frame)".to_string())
        }
        (Some(ImageFormat::Png), ValidationLevel::Strict) if !data.ends_with(&PNG_IEND) => {
            Some("PNG stream missing IEND chunk (truncated frame)".to_string())
        }
        _ => None,
    };

    ValidationResult {
        valid: failure_reason.is_none(),
        format,
        size,
        failure_reason,
    }
}
