//! Pixel buffers handed from decoders to uploaders.

use std::sync::Arc;

use crate::error::DecodeError;
use crate::Color;

/// Layout of a single pixel in a [`Pixels`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit RGBA, sRGB encoded.
    Rgba8Srgb,
    /// 8-bit RGBA, linear.
    Rgba8,
    /// 8-bit luminance + alpha.
    Rg8,
    /// 8-bit single channel, e.g. alpha masks.
    R8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8Srgb | PixelFormat::Rgba8 => 4,
            PixelFormat::Rg8 => 2,
            PixelFormat::R8 => 1,
        }
    }
}

/// A decoded image, tightly packed row by row.
///
/// The buffer is reference counted so that keeping a copy around for
/// recreation does not duplicate the pixel data.
#[derive(Clone, PartialEq)]
pub struct Pixels {
    data: Arc<[u8]>,
    size: glam::UVec2,
    format: PixelFormat,
}

impl Pixels {
    /// Wraps a pixel buffer.
    ///
    /// Fails if `data` is not exactly `width * height * bytes_per_pixel` long.
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        size: glam::UVec2,
        format: PixelFormat,
    ) -> Result<Self, DecodeError> {
        let data = data.into();
        let expected = size.x as usize * size.y as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(DecodeError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, size, format })
    }

    /// Builds an sRGB buffer from RGBA colors.
    pub fn from_colors(colors: &[Color], size: glam::UVec2) -> Result<Self, DecodeError> {
        let data = colors
            .iter()
            .flat_map(|c| [c.r, c.g, c.b, c.a])
            .collect::<Vec<_>>();
        Self::new(data, size, PixelFormat::Rgba8Srgb)
    }

    pub fn size(&self) -> glam::UVec2 {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes in a single row.
    pub fn bytes_per_row(&self) -> usize {
        self.size.x as usize * self.format.bytes_per_pixel()
    }

    /// Total size of the buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Pixels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pixels")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}
