//! Moving pixels onto the GPU.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::error::UploadError;
use crate::key::CacheKey;
use crate::pixels::{PixelFormat, Pixels};

/// Creates and destroys GPU textures.
///
/// Only ever called on the thread that owns the GPU context.
pub trait Uploader {
    /// Handle to a GPU-resident texture.
    type Handle: Clone + 'static;

    /// Uploads `pixels` into a new texture.
    fn upload(&mut self, key: &CacheKey, pixels: &Pixels) -> Result<Self::Handle, UploadError>;

    /// Releases a texture created by [`Uploader::upload`].
    fn destroy(&mut self, handle: Self::Handle);
}

impl PixelFormat {
    /// The wgpu format textures of this pixel format are created with.
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rg8 => wgpu::TextureFormat::Rg8Unorm,
            PixelFormat::R8 => wgpu::TextureFormat::R8Unorm,
        }
    }
}

/// Uploads textures to a wgpu device.
///
/// After the device is lost, build a new uploader for the replacement device, hand it to
/// [`crate::TextureCache::set_uploader`] and call [`crate::TextureCache::recreate_all`].
pub struct WgpuUploader {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    usage: wgpu::TextureUsages,
}

impl WgpuUploader {
    /// Creates a new uploader.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self::with_usage(
            device,
            queue,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        )
    }

    /// Creates a new uploader whose textures have the given usage.
    ///
    /// `COPY_DST` is always added, since it is needed to fill the texture.
    pub fn with_usage(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self {
            device,
            queue,
            usage: usage | wgpu::TextureUsages::COPY_DST,
        }
    }

    /// Creates an uploader using the usage flags from `config`.
    pub fn from_config(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: &crate::Config,
    ) -> Self {
        Self::with_usage(device, queue, config.texture_usage)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl Uploader for WgpuUploader {
    type Handle = Arc<wgpu::Texture>;

    fn upload(&mut self, key: &CacheKey, pixels: &Pixels) -> Result<Self::Handle, UploadError> {
        let size = pixels.size();
        if size.x == 0 || size.y == 0 {
            return Err(UploadError::Empty);
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if size.x > max || size.y > max {
            return Err(UploadError::TooLarge {
                width: size.x,
                height: size.y,
                max,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(key.as_str()),
                size: wgpu::Extent3d {
                    width: size.x,
                    height: size.y,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: pixels.format().texture_format(),
                usage: self.usage,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::default(),
            pixels.as_bytes(),
        );
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            texture.destroy();
            return Err(UploadError::Rejected(err.to_string()));
        }

        Ok(Arc::new(texture))
    }

    fn destroy(&mut self, handle: Self::Handle) {
        handle.destroy();
    }
}
