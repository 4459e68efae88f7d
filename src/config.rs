//! Export options.
//!
//! Every field has a default, so `{}` is a valid options file. Options are
//! read from camelCase JSON:
//!
//! ```json
//! {
//!   "dpi": 200,
//!   "imageFormat": "png",
//!   "theme": "sepia",
//!   "pageFormat": "A5",
//!   "fonts": [{ "family": "Inter", "path": "fonts/Inter-Regular.ttf" }],
//!   "proxy": { "enabled": false }
//! }
//! ```

use crate::error::ConfigError;
use crate::font::FontContext;
use crate::image::{ImageFetcher, LocalFetcher, ProxyConfig};
use crate::layout::ImportOptions;
use crate::model::{Orientation, PageFormat};
use crate::render::RenderOptions;
use crate::theme::DEFAULT_THEME;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub use crate::image::ImageFormat;

pub const DEFAULT_DPI: u32 = 150;
pub const DPI_RANGE: RangeInclusive<u32> = 36..=600;
pub const DEFAULT_IMAGE_QUALITY: u8 = 90;
pub const QUALITY_RANGE: RangeInclusive<u8> = 1..=100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub dpi: u32,
    pub image_format: ImageFormat,
    pub image_quality: u8,
    pub optimize_images: bool,
    pub page_format: PageFormat,
    pub orientation: Orientation,
    /// Unknown names fall back to the default theme at export time.
    pub theme: String,
    pub include_toc: bool,
    pub include_map: bool,
    pub include_recommendations: bool,
    pub fonts: Vec<FontSource>,
    pub proxy: ProxyConfig,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            image_format: ImageFormat::Jpeg,
            image_quality: DEFAULT_IMAGE_QUALITY,
            optimize_images: true,
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
            theme: DEFAULT_THEME.to_string(),
            include_toc: true,
            include_map: true,
            include_recommendations: true,
            fonts: Vec::new(),
            proxy: ProxyConfig::default(),
        }
    }
}

/// A TrueType/OpenType font to register for a family. Exactly one of
/// `path` and `src` (a data URI or raw base64) must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSource {
    pub family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub italic: bool,
}

fn default_weight() -> u32 {
    400
}

impl FontSource {
    pub fn load(&self) -> Result<Vec<u8>, ConfigError> {
        match (&self.path, &self.src) {
            (Some(path), None) => std::fs::read(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
            (None, Some(src)) => LocalFetcher.fetch(src).map_err(|e| ConfigError::Invalid {
                field: "fonts",
                reason: format!("font '{}': {}", self.family, e),
            }),
            _ => Err(ConfigError::Invalid {
                field: "fonts",
                reason: format!("font '{}' needs exactly one of path or src", self.family),
            }),
        }
    }
}

impl ExportOptions {
    /// Parse and validate options from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: ExportOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from a file. Relative font paths resolve against the
    /// file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut options = Self::from_json_str(&json)?;
        if let Some(dir) = path.parent() {
            for font in &mut options.fonts {
                if let Some(font_path) = font.path.as_mut().filter(|p| p.is_relative()) {
                    *font_path = dir.join(&*font_path);
                }
            }
        }
        log::debug!("loaded export options from {}", path.display());
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !DPI_RANGE.contains(&self.dpi) {
            return Err(ConfigError::Invalid {
                field: "dpi",
                reason: format!(
                    "{} is outside {}..={}",
                    self.dpi,
                    DPI_RANGE.start(),
                    DPI_RANGE.end()
                ),
            });
        }
        if !QUALITY_RANGE.contains(&self.image_quality) {
            return Err(ConfigError::Invalid {
                field: "imageQuality",
                reason: format!("{} is outside 1..=100", self.image_quality),
            });
        }
        if let PageFormat::Custom { width, height } = self.page_format {
            if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
                return Err(ConfigError::Invalid {
                    field: "pageFormat",
                    reason: format!("custom size {}x{} mm must be positive", width, height),
                });
            }
        }
        if self.proxy.enabled {
            if self.proxy.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "proxy",
                    reason: "baseUrl is empty".to_string(),
                });
            }
            if self.proxy.max_width == 0 || !QUALITY_RANGE.contains(&self.proxy.quality) {
                return Err(ConfigError::Invalid {
                    field: "proxy",
                    reason: format!(
                        "maxWidth {} and quality {} must be positive, quality at most 100",
                        self.proxy.max_width, self.proxy.quality
                    ),
                });
            }
        }
        for font in &self.fonts {
            if font.family.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "fonts",
                    reason: "font family is empty".to_string(),
                });
            }
            if font.path.is_some() == font.src.is_some() {
                return Err(ConfigError::Invalid {
                    field: "fonts",
                    reason: format!("font '{}' needs exactly one of path or src", font.family),
                });
            }
        }
        Ok(())
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            include_toc: self.include_toc,
            include_map: self.include_map,
            include_recommendations: self.include_recommendations,
            page_format: self.page_format,
            orientation: self.orientation,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            format: self.image_format,
            quality: self.image_quality,
            optimize_images: self.optimize_images,
        }
    }

    /// A font context with every configured font registered.
    pub fn font_context(&self) -> Result<FontContext, ConfigError> {
        let mut fonts = FontContext::new();
        for font in &self.fonts {
            fonts.register(&font.family, font.weight, font.italic, font.load()?)?;
        }
        Ok(fonts)
    }
}
