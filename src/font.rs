//! Various types for fonts.

pub use cosmic_text::{FamilyOwned as Family, Metrics, Stretch, Style, Weight};

/// Font attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Attrs {
    /// Font family (e.g. sans-serif, serif).
    pub family: Family,
    /// Font stretch (e.g. condensed, regular).
    pub stretch: Stretch,
    /// Font style (e.g. normal, italic, oblique).
    pub style: Style,
    /// Font weight.
    pub weight: Weight,
}

impl Default for Attrs {
    fn default() -> Self {
        Self {
            family: Family::SansSerif,
            stretch: Default::default(),
            style: Default::default(),
            weight: Default::default(),
        }
    }
}

impl Attrs {
    /// Attributes for a named font family.
    pub fn named(family: impl Into<String>) -> Self {
        let family: String = family.into();
        Self {
            family: Family::Name(family.into()),
            ..Default::default()
        }
    }

    pub(crate) fn as_cosmic(&self) -> cosmic_text::Attrs<'_> {
        cosmic_text::Attrs::new()
            .family(self.family.as_family())
            .stretch(self.stretch)
            .style(self.style)
            .weight(self.weight)
    }
}

/// Horizontal alignment of text lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl From<Alignment> for cosmic_text::Align {
    fn from(alignment: Alignment) -> Self {
        match alignment {
            Alignment::Left => cosmic_text::Align::Left,
            Alignment::Center => cosmic_text::Align::Center,
            Alignment::Right => cosmic_text::Align::Right,
        }
    }
}
