//! RGB to sink pixel format conversion
//!
//! Decoded frames are always RGB24. Virtual camera devices want a fixed
//! channel order, so the last step before the sink rewrites each frame into
//! the sink's [`PixelFormat`].
//!
//! # Supported Formats
//!
//! - **RGB24**: R-G-B, passed through unchanged
//! - **BGR24**: B-G-R, channels swapped
//! - **YUYV**: YUV 4:2:2 packed (Y0-U-Y1-V), BT.601 limited range

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error type for conversion failures
#[derive(Debug, Clone)]
pub struct ConversionError(pub String);

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConversionError {}

impl From<String> for ConversionError {
    fn from(s: String) -> Self {
        ConversionError(s)
    }
}

/// Pixel layout expected by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 3 bytes per pixel, R-G-B order
    #[default]
    Rgb24,
    /// 3 bytes per pixel, B-G-R order
    Bgr24,
    /// YUV 4:2:2 packed, 2 bytes per pixel, Y0-U-Y1-V order
    Yuyv,
}

impl PixelFormat {
    /// Bytes used per pixel in this format
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 | Self::Bgr24 => 3,
            Self::Yuyv => 2,
        }
    }

    /// Size of one frame in this format
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// Name as used in configuration
    pub fn name(self) -> &'static str {
        match self {
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Yuyv => "yuyv",
        }
    }
}

impl FromStr for PixelFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rgb24" | "rgb" => Ok(Self::Rgb24),
            "bgr24" | "bgr" => Ok(Self::Bgr24),
            "yuyv" | "yuy2" => Ok(Self::Yuyv),
            other => Err(ConversionError(format!("unknown pixel format '{}'", other))),
        }
    }
}

/// Convert an RGB24 frame into the requested pixel format
///
/// # Errors
/// Returns `ConversionError` if the input data is too small for the specified
/// dimensions, or if YUYV output is requested for an odd width.
pub fn convert_rgb_frame(
    rgb: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>, ConversionError> {
    match format {
        PixelFormat::Rgb24 => pass_through_rgb888(rgb, width, height),
        PixelFormat::Bgr24 => convert_rgb888_to_bgr(rgb, width, height),
        PixelFormat::Yuyv => convert_rgb888_to_yuyv(rgb, width, height),
    }
}

fn check_rgb_size(data: &[u8], width: u32, height: u32) -> Result<usize, ConversionError> {
    let expected = PixelFormat::Rgb24.frame_size(width, height);
    if data.len() < expected {
        return Err(ConversionError(format!(
            "RGB888 data too small: {} bytes, expected {} for {}x{}",
            data.len(),
            expected,
            width,
            height
        )));
    }
    Ok(expected)
}

/// Pass through RGB888 data directly (no conversion needed)
///
/// # Errors
/// Returns `ConversionError` if the input data is too small for the specified dimensions.
pub fn pass_through_rgb888(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ConversionError> {
    let expected = check_rgb_size(data, width, height)?;
    Ok(data[..expected].to_vec())
}

/// Convert RGB888 to BGR888 by swapping R and B channels
///
/// # Errors
/// Returns `ConversionError` if the input data is too small for the specified dimensions.
pub fn convert_rgb888_to_bgr(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ConversionError> {
    let expected = check_rgb_size(data, width, height)?;

    let mut bgr = Vec::with_capacity(expected);
    for chunk in data[..expected].chunks_exact(3) {
        bgr.push(chunk[2]);
        bgr.push(chunk[1]);
        bgr.push(chunk[0]);
    }

    Ok(bgr)
}

/// Convert RGB to YUV using BT.601 limited range coefficients
///
/// BT.601 limited range:
/// - Y: 16-235
/// - U, V: 16-240, centered at 128
#[inline]
pub fn rgb_to_yuv_bt601(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));

    // Coefficients scaled by 256 for integer math
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;

    (
        y.clamp(16, 235) as u8,
        u.clamp(16, 240) as u8,
        v.clamp(16, 240) as u8,
    )
}

/// Convert RGB888 to YUYV (YUV 4:2:2 packed)
///
/// Each pair of pixels shares the average of their chroma.
///
/// # Errors
/// Returns `ConversionError` if the input data is too small or the width is odd.
pub fn convert_rgb888_to_yuyv(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ConversionError> {
    if width % 2 != 0 {
        return Err(ConversionError(format!(
            "YUYV needs an even width, got {}",
            width
        )));
    }
    let expected = check_rgb_size(data, width, height)?;

    let mut yuyv = Vec::with_capacity(PixelFormat::Yuyv.frame_size(width, height));
    for pair in data[..expected].chunks_exact(6) {
        let (y0, u0, v0) = rgb_to_yuv_bt601(pair[0], pair[1], pair[2]);
        let (y1, u1, v1) = rgb_to_yuv_bt601(pair[3], pair[4], pair[5]);

        yuyv.push(y0);
        yuyv.push(((u16::from(u0) + u16::from(u1) + 1) / 2) as u8);
        yuyv.push(y1);
        yuyv.push(((u16::from(v0) + u16::from(v1) + 1) / 2) as u8);
    }

    Ok(yuyv)
}

// ============================================================================
// Unit Tests
// ============================================================================
