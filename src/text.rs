//! Textures rendered from text.

use crate::error::DecodeError;
use crate::font::{self, Alignment};
use crate::pixels::{PixelFormat, Pixels};
use crate::Color;

/// Everything needed to render a piece of text into a texture.
///
/// This is kept alongside the texture so it can be rendered again after the GPU context
/// is lost.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDesc {
    pub text: String,
    pub attrs: font::Attrs,
    /// Font size in pixels.
    pub font_size: f32,
    /// Fixed texture size. A zero component is measured from the laid out text.
    pub dimensions: glam::UVec2,
    pub alignment: Alignment,
    pub color: Color,
}

impl TextDesc {
    /// White, left-aligned text in the default font, sized to fit.
    pub fn new(text: impl Into<String>, font_size: f32) -> Self {
        Self {
            text: text.into(),
            attrs: font::Attrs::default(),
            font_size,
            dimensions: glam::UVec2::ZERO,
            alignment: Alignment::Left,
            color: Color::new(0xff, 0xff, 0xff, 0xff),
        }
    }

    pub fn with_attrs(mut self, attrs: font::Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_dimensions(mut self, dimensions: glam::UVec2) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    fn metrics(&self) -> font::Metrics {
        font::Metrics::new(self.font_size, (self.font_size * 1.2).ceil())
    }
}

/// Renders text into pixels.
pub trait Rasterizer {
    fn rasterize(&mut self, desc: &TextDesc) -> Result<Pixels, DecodeError>;
}

/// A [`Rasterizer`] using cosmic-text.
pub struct CosmicRasterizer {
    font_system: cosmic_text::FontSystem,
    swash_cache: cosmic_text::SwashCache,
}

impl Default for CosmicRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CosmicRasterizer {
    /// Creates a rasterizer with no fonts loaded. Add some with [`CosmicRasterizer::add_font`].
    pub fn new() -> Self {
        Self {
            font_system: cosmic_text::FontSystem::new_with_locale_and_db(
                sys_locale::get_locale().unwrap_or_else(|| "en-US".to_string()),
                cosmic_text::fontdb::Database::new(),
            ),
            swash_cache: cosmic_text::SwashCache::new(),
        }
    }

    /// Creates a rasterizer that can use the fonts installed on the system.
    pub fn with_system_fonts() -> Self {
        Self {
            font_system: cosmic_text::FontSystem::new(),
            swash_cache: cosmic_text::SwashCache::new(),
        }
    }

    /// Adds a font.
    pub fn add_font(&mut self, font: &[u8]) {
        self.font_system.db_mut().load_font_data(font.to_vec());
    }

    fn layout(&mut self, desc: &TextDesc) -> (cosmic_text::Buffer, glam::UVec2) {
        let fixed = |v: u32| (v > 0).then_some(v as f32);

        let mut buffer = cosmic_text::Buffer::new(&mut self.font_system, desc.metrics());
        buffer.set_size(
            &mut self.font_system,
            fixed(desc.dimensions.x),
            fixed(desc.dimensions.y),
        );
        buffer.set_text(
            &mut self.font_system,
            &desc.text,
            desc.attrs.as_cosmic(),
            cosmic_text::Shaping::Advanced,
        );
        for line in buffer.lines.iter_mut() {
            line.set_align(Some(desc.alignment.into()));
        }
        buffer.shape_until_scroll(&mut self.font_system, false);

        let mut width = 0.0f32;
        let mut height = 0.0f32;
        for run in buffer.layout_runs() {
            width = width.max(run.line_w);
            height = run.line_top + run.line_height;
        }
        let size = glam::UVec2::new(
            if desc.dimensions.x > 0 {
                desc.dimensions.x
            } else {
                width.ceil() as u32
            },
            if desc.dimensions.y > 0 {
                desc.dimensions.y
            } else {
                height.ceil() as u32
            },
        );

        // Alignment needs a width to align against.
        if desc.dimensions.x == 0 && size.x > 0 {
            buffer.set_size(&mut self.font_system, Some(size.x as f32), fixed(desc.dimensions.y));
            buffer.shape_until_scroll(&mut self.font_system, false);
        }

        (buffer, size)
    }
}

impl Rasterizer for CosmicRasterizer {
    fn rasterize(&mut self, desc: &TextDesc) -> Result<Pixels, DecodeError> {
        // Shaping without any font face panics inside cosmic-text.
        if !desc.text.is_empty() && self.font_system.db().is_empty() {
            return Err(DecodeError::NoFonts);
        }
        let (buffer, size) = self.layout(desc);
        if size.x == 0 || size.y == 0 {
            return Err(DecodeError::Empty);
        }

        let stride = size.x as usize * 4;
        let mut data = vec![0u8; stride * size.y as usize];
        let color = cosmic_text::Color::rgba(desc.color.r, desc.color.g, desc.color.b, desc.color.a);
        buffer.draw(
            &mut self.font_system,
            &mut self.swash_cache,
            color,
            |x, y, w, h, color| {
                if color.a() == 0 {
                    return;
                }
                let x0 = x.max(0) as u32;
                let y0 = y.max(0) as u32;
                let x1 = (x + w as i32).clamp(0, size.x as i32) as u32;
                let y1 = (y + h as i32).clamp(0, size.y as i32) as u32;
                for py in y0..y1 {
                    for px in x0..x1 {
                        let i = py as usize * stride + px as usize * 4;
                        blend(&mut data[i..i + 4], color);
                    }
                }
            },
        );

        Pixels::new(data, size, PixelFormat::Rgba8Srgb)
    }
}

/// Composites `src` over `dst`, both straight alpha.
fn blend(dst: &mut [u8], src: cosmic_text::Color) {
    let sa = src.a() as u32;
    let da = dst[3] as u32;
    let out_a = sa + da * (255 - sa) / 255;
    if out_a == 0 {
        return;
    }
    for (d, s) in dst[..3].iter_mut().zip([src.r(), src.g(), src.b()]) {
        *d = ((s as u32 * sa + *d as u32 * da * (255 - sa) / 255) / out_a) as u8;
    }
    dst[3] = out_a as u8;
}
