//! # Font Management
//!
//! Font lookup and text measurement for the raster renderer.
//!
//! Three standard faces (Helvetica, Times, Courier) are always available and
//! measure with their AFM widths. They have no outlines here, so the renderer
//! draws them with the built-in [`bitmap`] face. TrueType/OpenType fonts can
//! be registered per family, weight and style; those measure with their own
//! advance widths and are drawn from their outlines.

pub mod bitmap;
pub mod metrics;

pub use metrics::StandardFontMetrics;

use crate::error::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

/// A font registry that maps family + weight + style to font data.
#[derive(Debug, Clone)]
pub struct FontRegistry {
    fonts: HashMap<FontKey, FontData>,
    fallback: FontData,
}

/// Families are matched case-insensitively; keys store them lowercased.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub weight: u32,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, weight: u32, italic: bool) -> Self {
        Self {
            family: family.trim().to_lowercase(),
            weight,
            italic,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FontData {
    /// A built-in face: metrics only, drawn with the bitmap face.
    Standard(StandardFont),
    /// A registered TrueType/OpenType font.
    Custom {
        data: Arc<Vec<u8>>,
        metrics: CustomFontMetrics,
    },
}

impl FontData {
    pub fn is_bold(&self) -> bool {
        match self {
            FontData::Standard(f) => f.bold,
            FontData::Custom { .. } => false,
        }
    }

    pub fn is_italic(&self) -> bool {
        match self {
            FontData::Standard(f) => f.italic,
            FontData::Custom { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFace {
    Helvetica,
    Times,
    Courier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardFont {
    pub face: StandardFace,
    pub bold: bool,
    pub italic: bool,
}

impl StandardFont {
    pub const HELVETICA: StandardFont = StandardFont {
        face: StandardFace::Helvetica,
        bold: false,
        italic: false,
    };

    pub fn metrics(&self) -> StandardFontMetrics {
        match (self.face, self.bold) {
            (StandardFace::Helvetica, false) => metrics::HELVETICA,
            (StandardFace::Helvetica, true) => metrics::HELVETICA_BOLD,
            (StandardFace::Times, false) => metrics::TIMES,
            (StandardFace::Times, true) => metrics::TIMES_BOLD,
            (StandardFace::Courier, _) => metrics::COURIER,
        }
    }
}

/// Metrics parsed from a TrueType/OpenType font via ttf-parser.
#[derive(Debug, Clone)]
pub struct CustomFontMetrics {
    pub units_per_em: u16,
    pub advance_widths: HashMap<char, u16>,
    pub default_advance: u16,
    pub ascender: i16,
    pub descender: i16,
}

impl CustomFontMetrics {
    /// Advance width of a character in points.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        let w = self
            .advance_widths
            .get(&ch)
            .copied()
            .unwrap_or(self.default_advance);
        (w as f64 / self.units_per_em as f64) * font_size
    }

    pub fn from_font_data(data: &[u8]) -> Option<Self> {
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        let units_per_em = face.units_per_em();
        if units_per_em == 0 {
            return None;
        }

        let mut advance_widths = HashMap::new();
        let mut default_advance = 0u16;

        // The Basic Multilingual Plane covers everything article text needs.
        for code in 32u32..=0xFFFF {
            if let Some(ch) = char::from_u32(code) {
                if let Some(glyph_id) = face.glyph_index(ch) {
                    let advance = face.glyph_hor_advance(glyph_id).unwrap_or(0);
                    advance_widths.insert(ch, advance);
                    if ch == ' ' {
                        default_advance = advance;
                    }
                }
            }
        }

        if default_advance == 0 {
            default_advance = units_per_em / 2;
        }

        Some(CustomFontMetrics {
            units_per_em,
            advance_widths,
            default_advance,
            ascender: face.ascender(),
            descender: face.descender(),
        })
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        let mut fonts = HashMap::new();

        let families: [(&[&str], StandardFace); 3] = [
            (&["helvetica", "arial", "sans-serif"], StandardFace::Helvetica),
            (&["times", "times new roman", "georgia", "serif"], StandardFace::Times),
            (&["courier", "courier new", "monospace"], StandardFace::Courier),
        ];
        for (names, face) in families {
            for name in names {
                for (weight, bold) in [(400, false), (700, true)] {
                    for italic in [false, true] {
                        fonts.insert(
                            FontKey::new(name, weight, italic),
                            FontData::Standard(StandardFont { face, bold, italic }),
                        );
                    }
                }
            }
        }

        Self {
            fonts,
            fallback: FontData::Standard(StandardFont::HELVETICA),
        }
    }

    /// Look up a font, falling back to Helvetica if not found.
    pub fn resolve(&self, family: &str, weight: u32, italic: bool) -> &FontData {
        if let Some(font) = self.fonts.get(&FontKey::new(family, weight, italic)) {
            return font;
        }

        // Snap to 400 or 700
        let snapped_weight = if weight >= 600 { 700 } else { 400 };
        if let Some(font) = self.fonts.get(&FontKey::new(family, snapped_weight, italic)) {
            return font;
        }

        // A registered family missing this style still beats another family.
        for (w, i) in [(snapped_weight, false), (400, italic), (400, false)] {
            if let Some(font) = self.fonts.get(&FontKey::new(family, w, i)) {
                return font;
            }
        }

        log::debug!("font '{}' {} not registered; using Helvetica", family, weight);
        self.fonts
            .get(&FontKey::new("helvetica", snapped_weight, italic))
            .unwrap_or(&self.fallback)
    }

    /// Register a TrueType/OpenType font. Fails if the data does not parse.
    pub fn register(
        &mut self,
        family: &str,
        weight: u32,
        italic: bool,
        data: Vec<u8>,
    ) -> Result<(), ConfigError> {
        let metrics = CustomFontMetrics::from_font_data(&data).ok_or_else(|| ConfigError::Invalid {
            field: "fonts",
            reason: format!("'{}' is not a readable TrueType/OpenType font", family),
        })?;
        log::debug!(
            "registered font '{}' {}{} ({} glyphs)",
            family,
            weight,
            if italic { " italic" } else { "" },
            metrics.advance_widths.len()
        );
        self.fonts.insert(
            FontKey::new(family, weight, italic),
            FontData::Custom {
                data: Arc::new(data),
                metrics,
            },
        );
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FontKey, &FontData)> {
        self.fonts.iter()
    }
}

/// Text measurement shared by the renderer and the line breaker.
#[derive(Debug, Clone, Default)]
pub struct FontContext {
    registry: FontRegistry,
}

impl FontContext {
    pub fn new() -> Self {
        Self {
            registry: FontRegistry::new(),
        }
    }

    pub fn register(
        &mut self,
        family: &str,
        weight: u32,
        italic: bool,
        data: Vec<u8>,
    ) -> Result<(), ConfigError> {
        self.registry.register(family, weight, italic, data)
    }

    /// Advance width of a single character in points.
    pub fn char_width(
        &self,
        ch: char,
        family: &str,
        weight: u32,
        italic: bool,
        font_size: f64,
    ) -> f64 {
        match self.registry.resolve(family, weight, italic) {
            FontData::Standard(std_font) => std_font.metrics().char_width(ch, font_size),
            FontData::Custom { metrics, .. } => metrics.char_width(ch, font_size),
        }
    }

    /// Width of a string in points.
    pub fn measure_string(
        &self,
        text: &str,
        family: &str,
        weight: u32,
        italic: bool,
        font_size: f64,
        letter_spacing: f64,
    ) -> f64 {
        match self.registry.resolve(family, weight, italic) {
            FontData::Standard(std_font) => {
                std_font
                    .metrics()
                    .measure_string(text, font_size, letter_spacing)
            }
            FontData::Custom { metrics, .. } => text
                .chars()
                .map(|ch| metrics.char_width(ch, font_size) + letter_spacing)
                .sum(),
        }
    }

    /// Ascent and descent below the baseline, both positive, in points.
    pub fn vertical_metrics(
        &self,
        family: &str,
        weight: u32,
        italic: bool,
        font_size: f64,
    ) -> (f64, f64) {
        let (ascender, descender, units) = match self.registry.resolve(family, weight, italic) {
            FontData::Standard(std_font) => {
                let m = std_font.metrics();
                (m.ascender, m.descender, 1000)
            }
            FontData::Custom { metrics, .. } => {
                (metrics.ascender, metrics.descender, metrics.units_per_em)
            }
        };
        let scale = font_size / units as f64;
        (ascender as f64 * scale, -(descender as f64) * scale)
    }

    pub fn resolve(&self, family: &str, weight: u32, italic: bool) -> &FontData {
        self.registry.resolve(family, weight, italic)
    }

    pub fn registry(&self) -> &FontRegistry {
        &self.registry
    }
}
