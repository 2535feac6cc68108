use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::key::CacheKey;
use crate::pixels::PixelFormat;

struct Gpu<H> {
    handle: H,
    size: glam::UVec2,
    format: PixelFormat,
    generation: u32,
}

struct Shared<H> {
    key: CacheKey,
    gpu: RwLock<Gpu<H>>,
    live: AtomicBool,
}

/// A texture owned by a [`crate::TextureCache`].
///
/// Cloning is cheap and every clone refers to the same logical texture. When the cache
/// recreates the texture after a context loss, the GPU handle behind it is swapped in
/// place, so holders keep a valid texture without asking the cache again. Holders that
/// copied the handle out with [`Texture::handle`] should fetch it again once
/// [`Texture::generation`] changes.
///
/// Two textures compare equal only if they are the same logical texture.
pub struct Texture<H> {
    shared: Arc<Shared<H>>,
}

impl<H> Texture<H> {
    pub(crate) fn new(key: CacheKey, handle: H, size: glam::UVec2, format: PixelFormat) -> Self {
        Self {
            shared: Arc::new(Shared {
                key,
                gpu: RwLock::new(Gpu {
                    handle,
                    size,
                    format,
                    generation: 0,
                }),
                live: AtomicBool::new(true),
            }),
        }
    }

    /// The key this texture is cached under.
    pub fn key(&self) -> &CacheKey {
        &self.shared.key
    }

    /// Runs `f` with the current GPU handle.
    pub fn with_handle<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.shared.gpu.read().handle)
    }

    pub fn size(&self) -> glam::UVec2 {
        self.shared.gpu.read().size
    }

    pub fn format(&self) -> PixelFormat {
        self.shared.gpu.read().format
    }

    /// How many times the GPU handle has been replaced by recreation.
    pub fn generation(&self) -> u32 {
        self.shared.gpu.read().generation
    }

    /// Size of the pixel data in bytes.
    pub fn byte_len(&self) -> usize {
        let gpu = self.shared.gpu.read();
        gpu.size.x as usize * gpu.size.y as usize * gpu.format.bytes_per_pixel()
    }

    /// Whether the texture is still in the cache.
    ///
    /// Once evicted, its GPU handle has been destroyed and must not be used.
    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Whether `self` and `other` are the same logical texture.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Installs a new GPU handle, returning the old one.
    pub(crate) fn replace(&self, handle: H, size: glam::UVec2, format: PixelFormat) -> H {
        let mut gpu = self.shared.gpu.write();
        gpu.size = size;
        gpu.format = format;
        gpu.generation += 1;
        std::mem::replace(&mut gpu.handle, handle)
    }

    pub(crate) fn retire(&self) {
        self.shared.live.store(false, Ordering::Release);
    }
}

impl<H: Clone> Texture<H> {
    /// A copy of the current GPU handle.
    pub fn handle(&self) -> H {
        self.shared.gpu.read().handle.clone()
    }
}

impl<H> Clone for Texture<H> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<H> PartialEq for Texture<H> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<H> Eq for Texture<H> {}

impl<H> std::fmt::Debug for Texture<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gpu = self.shared.gpu.read();
        f.debug_struct("Texture")
            .field("key", &self.shared.key)
            .field("size", &gpu.size)
            .field("format", &gpu.format)
            .field("generation", &gpu.generation)
            .field("live", &self.is_live())
            .finish()
    }
}
