//! Turning encoded images into [`Pixels`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DecodeError;
use crate::pixels::Pixels;

/// Container format hint for a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    WebP,
}

impl ImageFormat {
    /// Guesses the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext.to_ascii_lowercase().as_str() {
            "png" => ImageFormat::Png,
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "gif" => ImageFormat::Gif,
            "bmp" => ImageFormat::Bmp,
            "tif" | "tiff" => ImageFormat::Tiff,
            "webp" => ImageFormat::WebP,
            _ => return None,
        })
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Something a [`Decoder`] can read an image from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A file on disk.
    Path {
        path: PathBuf,
        format: Option<ImageFormat>,
    },
    /// An encoded image already in memory.
    Encoded {
        bytes: Arc<[u8]>,
        format: Option<ImageFormat>,
    },
}

impl Source {
    /// A file source, with the format guessed from its extension.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ImageFormat::from_path(&path);
        Source::Path { path, format }
    }

    pub fn encoded(bytes: impl Into<Arc<[u8]>>, format: Option<ImageFormat>) -> Self {
        Source::Encoded {
            bytes: bytes.into(),
            format,
        }
    }

    pub fn format(&self) -> Option<ImageFormat> {
        match self {
            Source::Path { format, .. } | Source::Encoded { format, .. } => *format,
        }
    }
}

/// Decodes images.
///
/// Decoders run on worker threads and must not touch GPU state.
pub trait Decoder: Send + Sync {
    /// Decodes `source` into a pixel buffer.
    fn decode(&self, source: &Source) -> Result<Pixels, DecodeError>;
}

/// A [`Decoder`] backed by the `image` crate.
///
/// Every image is converted to 8-bit RGBA.
#[cfg(feature = "image")]
#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    /// Whether decoded color is tagged as sRGB (the default) or linear.
    pub srgb: bool,
}

#[cfg(feature = "image")]
impl Default for ImageDecoder {
    fn default() -> Self {
        Self { srgb: true }
    }
}

#[cfg(feature = "image")]
impl ImageDecoder {
    fn decode_bytes(
        &self,
        bytes: &[u8],
        format: Option<ImageFormat>,
    ) -> Result<Pixels, DecodeError> {
        let decoded = match format {
            Some(format) => image::load_from_memory_with_format(bytes, format.into()),
            None => image::load_from_memory(bytes),
        }
        .map_err(|e| match e {
            image::ImageError::Unsupported(e) => DecodeError::Unsupported(e.to_string()),
            e => DecodeError::Malformed(e.to_string()),
        })?;

        let rgba = decoded.into_rgba8();
        let size = glam::UVec2::new(rgba.width(), rgba.height());
        if size.x == 0 || size.y == 0 {
            return Err(DecodeError::Empty);
        }
        Pixels::new(
            rgba.into_raw(),
            size,
            if self.srgb {
                crate::PixelFormat::Rgba8Srgb
            } else {
                crate::PixelFormat::Rgba8
            },
        )
    }
}

#[cfg(feature = "image")]
impl Decoder for ImageDecoder {
    fn decode(&self, source: &Source) -> Result<Pixels, DecodeError> {
        match source {
            Source::Path { path, format } => {
                let bytes = std::fs::read(path).map_err(|e| DecodeError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                self.decode_bytes(&bytes, *format)
            }
            Source::Encoded { bytes, format } => self.decode_bytes(bytes, *format),
        }
    }
}

#[cfg(feature = "image")]
impl From<ImageFormat> for image::ImageFormat {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Gif => image::ImageFormat::Gif,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
            ImageFormat::WebP => image::ImageFormat::WebP,
        }
    }
}
