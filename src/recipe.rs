use std::sync::Arc;

use crate::decode::{Decoder, Source};
use crate::error::DecodeError;
use crate::pixels::Pixels;
#[cfg(feature = "text")]
use crate::text::{Rasterizer, TextDesc};

/// How to produce a texture's pixels again after the GPU context is lost.
///
/// Every cached texture owns exactly one recipe.
#[derive(Debug, Clone)]
pub enum Recipe {
    /// Decode an image file or encoded buffer again.
    Decode(Source),
    /// Re-upload a retained pixel buffer.
    Pixels(Pixels),
    /// Render text again.
    #[cfg(feature = "text")]
    Text(TextDesc),
}

impl Recipe {
    pub fn kind(&self) -> &'static str {
        match self {
            Recipe::Decode(Source::Path { .. }) => "file",
            Recipe::Decode(Source::Encoded { .. }) => "encoded",
            Recipe::Pixels(_) => "pixels",
            #[cfg(feature = "text")]
            Recipe::Text(_) => "text",
        }
    }
}

/// The things that turn recipes into pixels.
pub(crate) struct Producers {
    pub decoder: Arc<dyn Decoder>,
    #[cfg(feature = "text")]
    pub rasterizer: Box<dyn Rasterizer>,
}

impl Producers {
    pub fn render(&mut self, recipe: &Recipe) -> Result<Pixels, DecodeError> {
        match recipe {
            Recipe::Decode(source) => self.decoder.decode(source),
            Recipe::Pixels(pixels) => Ok(pixels.clone()),
            #[cfg(feature = "text")]
            Recipe::Text(desc) => self.rasterizer.rasterize(desc),
        }
    }
}
