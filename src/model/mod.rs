//! # Document Model
//!
//! The paginated representation every later stage works from: a document owns
//! pages, a page owns positioned blocks, and every block carries an absolute
//! rectangle (in millimetres or percent of the page) plus its content.
//!
//! Unlike a flowing DOM, nothing here is relative. Layout has already decided
//! where each block goes; the renderer only has to paint.
//!
//! Structural edits go through [`DocumentBuilder`], which keeps page indices
//! contiguous and bumps `version` / `updated_at`.

mod builder;

pub use builder::DocumentBuilder;

use crate::content::{CalloutVariant, ImageRef};
use crate::error::ModelError;
use crate::theme::Color;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete paginated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub pages: Vec<Page>,
    /// Theme name, resolved through the theme registry at render time.
    pub theme: String,
    pub page_format: PageFormat,
    pub orientation: Orientation,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn page(&self, page_id: &str) -> Result<&Page, ModelError> {
        self.pages
            .iter()
            .find(|p| p.id == page_id)
            .ok_or_else(|| ModelError::PageNotFound(page_id.to_string()))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn block_count(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let mut document: Document = serde_json::from_str(json)?;
        // Stored drafts may predate renumbering; indices are derived state.
        for (i, page) in document.pages.iter_mut().enumerate() {
            page.index = i + 1;
        }
        Ok(document)
    }
}

/// What a page is for. Drives front-matter handling and lets callers pick
/// out content pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageKind {
    Cover,
    Toc,
    Meta,
    Content,
    Map,
    Recommendations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    /// 1-based, contiguous within the document.
    pub index: usize,
    pub kind: PageKind,
    pub format: PageFormat,
    pub orientation: Orientation,
    pub blocks: Vec<PositionedBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<PageBackground>,
    pub margins: Margins,
}

impl Page {
    /// Page size in millimetres, orientation applied.
    pub fn size_mm(&self) -> (f64, f64) {
        self.format.dimensions_mm(self.orientation)
    }

    /// The area inside the margins.
    pub fn content_area(&self) -> Rect {
        let (w, h) = self.size_mm();
        self.margins.content_area(w, h)
    }

    pub fn block(&self, block_id: &str) -> Option<&PositionedBlock> {
        self.blocks.iter().find(|b| b.id == block_id)
    }
}

/// A rectangle in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

// ── Page Geometry ──────────────────────────────────────────────

/// Standard paper sizes in millimetres (portrait).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PageFormat {
    #[serde(alias = "a3")]
    A3,
    #[default]
    #[serde(alias = "a4")]
    A4,
    #[serde(alias = "a5")]
    A5,
    #[serde(alias = "letter")]
    Letter,
    #[serde(alias = "legal")]
    Legal,
    Custom { width: f64, height: f64 },
}

impl PageFormat {
    pub fn dimensions_mm(&self, orientation: Orientation) -> (f64, f64) {
        let (w, h) = match self {
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A5 => (148.0, 210.0),
            PageFormat::Letter => (215.9, 279.4),
            PageFormat::Legal => (215.9, 355.6),
            PageFormat::Custom { width, height } => (*width, *height),
        };
        match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }

    /// Parse a case-insensitive format name such as `a4` or `letter`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "a3" => Some(PageFormat::A3),
            "a4" => Some(PageFormat::A4),
            "a5" => Some(PageFormat::A5),
            "letter" => Some(PageFormat::Letter),
            "legal" => Some(PageFormat::Legal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    /// The area inside these margins on a page of the given size.
    pub fn content_area(&self, page_width: f64, page_height: f64) -> Rect {
        Rect {
            x: self.left,
            y: self.top,
            width: (page_width - self.left - self.right).max(0.0),
            height: (page_height - self.top - self.bottom).max(0.0),
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(20.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBackground {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Two stops, top-left to bottom-right. Wins over `color`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient: Option<[Color; 2]>,
    /// Drawn over the color or gradient, covering the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

// ── Blocks ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedBlock {
    pub id: String,
    pub position: BlockPosition,
    #[serde(default)]
    pub style: BlockStyle,
    pub content: BlockContent,
}

impl PositionedBlock {
    pub fn new(position: BlockPosition, content: BlockContent) -> Self {
        Self {
            id: new_id(),
            position,
            style: BlockStyle::default(),
            content,
        }
    }

    pub fn with_style(mut self, style: BlockStyle) -> Self {
        self.style = style;
        self
    }

    /// The block type, taken from its content.
    pub fn kind(&self) -> &'static str {
        self.content.kind()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Unit {
    #[default]
    Mm,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockPosition {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub unit: Unit,
}

impl BlockPosition {
    pub fn mm(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            unit: Unit::Mm,
        }
    }

    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            unit: Unit::Percent,
        }
    }

    /// Resolve to a millimetre rectangle on a page of the given size.
    pub fn to_mm(&self, page_width: f64, page_height: f64) -> Rect {
        match self.unit {
            Unit::Mm => Rect {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
            },
            Unit::Percent => Rect {
                x: self.x / 100.0 * page_width,
                y: self.y / 100.0 * page_height,
                width: self.width / 100.0 * page_width,
                height: self.height / 100.0 * page_height,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Per-block visual overrides. Unset fields come from the theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockStyle {
    // ── Chrome ─────────────────────────────────────────────────
    pub background_color: Option<Color>,
    pub background_image: Option<String>,
    pub border_color: Option<Color>,
    /// Millimetres.
    pub border_width: Option<f64>,
    /// Millimetres.
    pub border_radius: Option<f64>,
    /// Millimetres, inside the block rectangle.
    pub padding: Option<f64>,

    // ── Typography ─────────────────────────────────────────────
    pub color: Option<Color>,
    /// Points.
    pub font_size: Option<f64>,
    pub font_weight: Option<u32>,
    pub italic: bool,
    pub align: TextAlign,
    pub line_height: Option<f64>,

    // ── Transform ──────────────────────────────────────────────
    pub opacity: f64,
    /// Degrees, clockwise, around the block center.
    pub rotation: f64,
    pub scale: f64,
    pub hidden: bool,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            background_color: None,
            background_image: None,
            border_color: None,
            border_width: None,
            border_radius: None,
            padding: None,
            color: None,
            font_size: None,
            font_weight: None,
            italic: false,
            align: TextAlign::Left,
            line_height: None,
            opacity: 1.0,
            rotation: 0.0,
            scale: 1.0,
            hidden: false,
        }
    }
}

/// How an image fills its block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageFit {
    /// Fill the block, cropping overflow.
    Cover,
    /// Fit inside the block, letterboxed.
    #[default]
    Contain,
}

/// Free-text roles used on front-matter pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextRole {
    Title,
    Subtitle,
    Byline,
    TocEntry,
    Label,
    Body,
}

/// What a block draws. The serde tag doubles as the block type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockContent {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    List {
        ordered: bool,
        items: Vec<String>,
    },
    Quote {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default)]
        fit: ImageFit,
    },
    Gallery {
        images: Vec<ImageRef>,
        columns: usize,
    },
    Callout {
        variant: CalloutVariant,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        text: String,
    },
    Code {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Table {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<Vec<String>>,
        rows: Vec<Vec<String>>,
    },
    Divider,
    Text {
        text: String,
        role: TextRole,
    },
    Map {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default)]
        points: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Spacer,
}

impl BlockContent {
    pub fn kind(&self) -> &'static str {
        match self {
            BlockContent::Heading { .. } => "heading",
            BlockContent::Paragraph { .. } => "paragraph",
            BlockContent::List { .. } => "list",
            BlockContent::Quote { .. } => "quote",
            BlockContent::Image { .. } => "image",
            BlockContent::Gallery { .. } => "gallery",
            BlockContent::Callout { .. } => "callout",
            BlockContent::Code { .. } => "code",
            BlockContent::Table { .. } => "table",
            BlockContent::Divider => "divider",
            BlockContent::Text { .. } => "text",
            BlockContent::Map { .. } => "map",
            BlockContent::Spacer => "spacer",
        }
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
