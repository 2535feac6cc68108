use std::sync::Arc;

use crate::key::CacheKey;

/// A source could not be turned into pixels.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The source file could not be read.
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    /// The source is in a format the decoder does not handle.
    #[error("unsupported image: {0}")]
    Unsupported(String),

    /// The source is damaged or not an image at all.
    #[error("malformed image: {0}")]
    Malformed(String),

    /// A pixel buffer does not match its declared dimensions.
    #[error("pixel buffer is {actual} bytes, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    /// The decoded or rendered image has no pixels.
    #[error("image is empty")]
    Empty,

    /// Text cannot be rendered because the rasterizer has no fonts.
    #[error("no fonts loaded to render text with")]
    NoFonts,

    /// The decoder panicked on a worker thread.
    #[error("decoder panicked: {0}")]
    Panicked(String),

    /// No decode worker is left to take the request.
    #[error("decode workers have shut down")]
    WorkerGone,
}

/// The GPU refused a texture.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Zero width or height.
    #[error("texture has no pixels")]
    Empty,

    /// Larger than the device allows.
    #[error("texture is {width}x{height}, device maximum is {max}")]
    TooLarge { width: u32, height: u32, max: u32 },

    /// The GPU API reported an error while creating the texture.
    #[error("texture rejected by the device: {0}")]
    Rejected(String),
}

/// Errors that can occur.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The key has no resident texture.
    #[error("no texture for {0}")]
    NotResident(CacheKey),

    /// The cache was torn down before the request completed.
    #[error("texture cache shut down")]
    ShutDown,

    /// A decode worker thread could not be started.
    #[error("failed to spawn decode worker: {0}")]
    Spawn(Arc<std::io::Error>),
}

/// A texture could not be regenerated from its recipe.
///
/// The texture keeps whatever GPU handle it had before.
#[derive(thiserror::Error, Debug, Clone)]
#[error("failed to recreate {key}: {cause}")]
pub struct RecreationError {
    pub key: CacheKey,
    #[source]
    pub cause: Error,
}
