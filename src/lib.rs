//! texturette is a texture cache for wgpu. It loads each image once, decodes it off the
//! render thread, and can rebuild every texture after the GPU device is lost.
//!
//! A [`TextureCache`] lives on the thread that owns the GPU context. Images are decoded
//! either right away with [`TextureCache::get_or_load`] or on worker threads with
//! [`TextureCache::get_or_load_async`]; in the latter case the engine calls
//! [`TextureCache::drain`] once per frame to upload finished decodes and run callbacks.
//!
//! Every cached texture remembers how it was made (a file, a pixel buffer or some text), so
//! after a device loss [`TextureCache::recreate_all`] can regenerate all of them without the
//! caller reloading anything. The [`Texture`] handles callers hold stay valid throughout.

mod cache;
mod config;
mod decode;
mod error;
#[cfg(feature = "text")]
pub mod font;
mod key;
mod pixels;
mod recipe;
#[cfg(feature = "text")]
mod text;
mod texture;
mod upload;
mod worker;

/// 8-bit RGBA color.
pub type Color = rgb::Rgba<u8>;

pub use cache::{CacheStats, Callback, TextureCache};
pub use config::Config;
#[cfg(feature = "image")]
pub use decode::ImageDecoder;
pub use decode::{Decoder, ImageFormat, Source};
pub use error::{DecodeError, Error, RecreationError, UploadError};
pub use key::CacheKey;
pub use pixels::{PixelFormat, Pixels};
pub use recipe::Recipe;
#[cfg(feature = "text")]
pub use text::{CosmicRasterizer, Rasterizer, TextDesc};
pub use texture::Texture;
pub use upload::{Uploader, WgpuUploader};
