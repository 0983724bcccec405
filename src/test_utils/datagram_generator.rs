//! Synthetic datagram generation for testing
//!
//! Builds real encoded images (JPEG/PNG) from known test patterns and splits
//! them into fragment datagrams exactly the way a sender would.
//!
//! # Example
//!
//! ```rust,ignore
//! use udpcam_lib::test_utils::{solid_image, DatagramGenerator, Rgb};
//!
//! let mut gen = DatagramGenerator::default();
//!
//! // Fragment datagrams for a solid red JPEG frame
//! let datagrams = gen.jpeg_frame(&solid_image(640, 480, Rgb::RED), 50)?;
//!
//! // Fragment datagrams for a PNG color bar pattern
//! let datagrams = gen.png_frame(&color_bars_image(640, 480, 0))?;
//! ```

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageResult, RgbImage};

use crate::packetizer::{packetize, PacketizeError, DEFAULT_MAX_PAYLOAD};

/// RGB color for test patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    /// Red component (0-255)
    pub r: u8,
    /// Green component (0-255)
    pub g: u8,
    /// Blue component (0-255)
    pub b: u8,
}

impl Rgb {
    /// Pure red color
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    /// Pure green color
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    /// Pure blue color
    pub const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };
    /// Pure white color
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };
    /// Pure black color
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    /// Medium gray color
    pub const GRAY: Rgb = Rgb {
        r: 128,
        g: 128,
        b: 128,
    };
    /// Yellow color
    pub const YELLOW: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 0,
    };
    /// Cyan color
    pub const CYAN: Rgb = Rgb {
        r: 0,
        g: 255,
        b: 255,
    };
    /// Magenta color
    pub const MAGENTA: Rgb = Rgb {
        r: 255,
        g: 0,
        b: 255,
    };

    /// Pixel value for the `image` crate
    pub fn to_pixel(self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }
}

/// SMPTE color bar order (left to right)
pub const COLOR_BARS: [Rgb; 8] = [
    Rgb::WHITE,
    Rgb::YELLOW,
    Rgb::CYAN,
    Rgb::GREEN,
    Rgb::MAGENTA,
    Rgb::RED,
    Rgb::BLUE,
    Rgb::BLACK,
];

/// Image filled with a single color
pub fn solid_image(width: u32, height: u32, color: Rgb) -> RgbImage {
    RgbImage::from_pixel(width, height, color.to_pixel())
}

/// Horizontal gray gradient, black on the left to white on the right
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        let level = (x * 255 / width.saturating_sub(1).max(1)) as u8;
        image::Rgb([level, level, level])
    })
}

/// Black and white 8x8 checkerboard
pub fn checkerboard_image(width: u32, height: u32) -> RgbImage {
    let block_size = 8u32;
    RgbImage::from_fn(width, height, |x, y| {
        if ((x / block_size) + (y / block_size)).is_multiple_of(2) {
            Rgb::WHITE.to_pixel()
        } else {
            Rgb::BLACK.to_pixel()
        }
    })
}

/// Eight vertical color bars, shifted right by `offset` pixels
///
/// Advancing `offset` every frame gives a moving pattern, which makes dropped
/// or repeated frames visible downstream.
pub fn color_bars_image(width: u32, height: u32, offset: u32) -> RgbImage {
    let bar_width = (width / COLOR_BARS.len() as u32).max(1);
    RgbImage::from_fn(width, height, |x, _| {
        let shifted = (x + width - offset % width.max(1)) % width.max(1);
        let bar_index = ((shifted / bar_width) as usize).min(COLOR_BARS.len() - 1);
        COLOR_BARS[bar_index].to_pixel()
    })
}

/// Encode an image as baseline JPEG
///
/// # Errors
///
/// Returns the encoder's error for images it cannot encode.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(img)?;
    Ok(buf)
}

/// Encode an image as PNG
///
/// # Errors
///
/// Returns the encoder's error for images it cannot encode.
pub fn encode_png(img: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Shuffle datagrams in place with a deterministic seed
///
/// Fisher-Yates driven by xorshift64, so a failing test reproduces exactly.
pub fn shuffle_datagrams<T>(datagrams: &mut [T], seed: u64) {
    let mut state = seed | 1;
    for i in (1..datagrams.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        datagrams.swap(i, j);
    }
}

/// Generates fragment datagrams for consecutive frames
pub struct DatagramGenerator {
    /// Maximum payload size per datagram (excluding header)
    pub max_payload_size: usize,
    /// Frame id used for the next frame (wraps at 16 bits)
    next_frame_id: u16,
}

impl Default for DatagramGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl DatagramGenerator {
    /// Create a generator with the given max payload size, starting at frame 0
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            max_payload_size,
            next_frame_id: 0,
        }
    }

    /// Start numbering frames at `frame_id`
    pub fn starting_at(mut self, frame_id: u16) -> Self {
        self.next_frame_id = frame_id;
        self
    }

    /// Frame id the next generated frame will carry
    pub fn next_frame_id(&self) -> u16 {
        self.next_frame_id
    }

    /// Split already-encoded bytes into datagrams for the next frame id
    ///
    /// # Errors
    ///
    /// Returns [`PacketizeError`] if the payload size is zero or the frame
    /// needs more fragments than the header can count.
    pub fn frame(&mut self, encoded: &[u8]) -> Result<Vec<Vec<u8>>, PacketizeError> {
        let datagrams = packetize(self.next_frame_id, encoded, self.max_payload_size)?;
        self.next_frame_id = self.next_frame_id.wrapping_add(1);
        Ok(datagrams)
    }

    /// Encode `img` as JPEG and split it into datagrams
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or fragmentation fails.
    pub fn jpeg_frame(&mut self, img: &RgbImage, quality: u8) -> anyhow::Result<Vec<Vec<u8>>> {
        let jpeg = encode_jpeg(img, quality)?;
        Ok(self.frame(&jpeg)?)
    }

    /// Encode `img` as PNG and split it into datagrams
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or fragmentation fails.
    pub fn png_frame(&mut self, img: &RgbImage) -> anyhow::Result<Vec<Vec<u8>>> {
        let png = encode_png(img)?;
        Ok(self.frame(&png)?)
    }
}
