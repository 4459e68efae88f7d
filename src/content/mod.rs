//! # Content Blocks
//!
//! The semantic units an article body is made of. [`ContentParser`] produces
//! them from markup; the flow engine places them on pages.
//!
//! Every text field is whitespace-normalized and non-empty. Blocks that would
//! be empty are dropped during parsing rather than emitted.

pub mod dom;
pub mod normalize;
mod parser;

pub use normalize::{normalize_code, normalize_text};
pub use parser::ContentParser;

use serde::{Deserialize, Serialize};

/// A semantic block of article content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Heading {
        /// 2 or 3 in parsed bodies; 1 is reserved for titles.
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
        /// Original inline markup, when the source had any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_markup: Option<String>,
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
    Image(ImageRef),
    ImageGallery {
        images: Vec<ImageRef>,
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
    Separator,
}

/// An image reference inside an Image or ImageGallery block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alt: None,
            caption: None,
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalloutVariant {
    Tip,
    Warning,
    Danger,
    Info,
}

impl CalloutVariant {
    /// Detect a variant from a class or data attribute value. Matches on
    /// word prefixes, so `tip-box` and `tips` count but `multiple` does not.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.to_lowercase();
        let words: Vec<&str> = hint
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|w| !w.is_empty())
            .collect();
        let has = |needles: &[&str]| {
            needles
                .iter()
                .any(|n| words.iter().any(|w| w.starts_with(n)))
        };
        if has(&["tip", "совет", "лайфхак"]) {
            Some(Self::Tip)
        } else if has(&["warning", "предупреждение", "важно"]) {
            Some(Self::Warning)
        } else if has(&["danger", "опасность"]) {
            Some(Self::Danger)
        } else if has(&["info", "информация", "note"]) {
            Some(Self::Info)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Tip => "Tip",
            Self::Warning => "Warning",
            Self::Danger => "Danger",
            Self::Info => "Info",
        }
    }
}

/// Number of grid columns a gallery of `count` images is laid out in.
pub fn gallery_columns(count: usize) -> usize {
    match count {
        0..=4 => 2,
        5..=6 => 3,
        _ => 4,
    }
}

impl ContentBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph {
            text: text.into(),
            raw_markup: None,
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::Heading {
            level,
            text: text.into(),
        }
    }

    /// Short name of the block kind, as used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "heading",
            Self::Paragraph { .. } => "paragraph",
            Self::List { .. } => "list",
            Self::Quote { .. } => "quote",
            Self::Image(_) => "image",
            Self::ImageGallery { .. } => "gallery",
            Self::Callout { .. } => "callout",
            Self::Code { .. } => "code",
            Self::Table { .. } => "table",
            Self::Separator => "separator",
        }
    }

    /// The primary text of the block, if it has one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Heading { text, .. }
            | Self::Paragraph { text, .. }
            | Self::Quote { text, .. }
            | Self::Callout { text, .. }
            | Self::Code { text, .. } => Some(text),
            Self::Image(image) => image.caption.as_deref(),
            Self::List { .. }
            | Self::ImageGallery { .. }
            | Self::Table { .. }
            | Self::Separator => None,
        }
    }
}
