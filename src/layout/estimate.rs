//! # Height Estimation
//!
//! The flow engine never measures real glyphs. It asks a [`HeightEstimator`]
//! how tall a block will be at a given column width and places it from that.
//! The estimate is deliberately coarse: an average glyph is assumed to be
//! [`AVG_GLYPH_WIDTH_RATIO`] of the font size wide, and every block gets a
//! fixed padding allowance.
//!
//! All results are millimetres.

use crate::content::{gallery_columns, ContentBlock};
use crate::theme::{TextStyle, Theme};

pub const PT_TO_MM: f64 = 0.352778;
pub const AVG_GLYPH_WIDTH_RATIO: f64 = 0.6;
pub const BLOCK_PADDING_MM: f64 = 5.0;
pub const LIST_ITEM_EXTRA_MM: f64 = 2.0;
pub const LIST_INDENT_MM: f64 = 6.0;
pub const QUOTE_PADDING_MM: f64 = 15.0;
pub const QUOTE_INSET_MM: f64 = 10.0;
pub const QUOTE_MIN_LINES: usize = 2;
pub const CALLOUT_PADDING_MM: f64 = 20.0;
pub const CALLOUT_INSET_MM: f64 = 20.0;
pub const CODE_SIZE_RATIO: f64 = 0.9;
pub const CODE_LINE_HEIGHT: f64 = 1.4;
pub const IMAGE_HEIGHT_MM: f64 = 100.0;
pub const IMAGE_MIN_HEIGHT_MM: f64 = 30.0;
pub const IMAGE_MAX_HEIGHT_MM: f64 = 160.0;
pub const GALLERY_ROW_HEIGHT_MM: f64 = 70.0;
pub const GALLERY_HEIGHT_MM: f64 = 150.0;
pub const TABLE_CELL_PADDING_MM: f64 = 2.0;
pub const SEPARATOR_HEIGHT_MM: f64 = 6.0;

/// Estimates the rendered height of a content block.
pub trait HeightEstimator {
    fn estimate(&self, block: &ContentBlock, width_mm: f64, theme: &Theme) -> f64;
}

/// Character-count heuristic used by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEstimator;

/// Line height of a text style in millimetres.
pub fn line_height_mm(style: &TextStyle) -> f64 {
    style.size * PT_TO_MM * style.line_height
}

/// How many lines `text` wraps to at `width_mm` in a font of `size_pt`.
pub fn estimate_lines(text: &str, width_mm: f64, size_pt: f64) -> usize {
    let glyph_mm = size_pt * PT_TO_MM * AVG_GLYPH_WIDTH_RATIO;
    if glyph_mm <= 0.0 {
        return 1;
    }
    let chars_per_line = ((width_mm / glyph_mm).floor() as usize).max(1);
    let len = text.chars().count();
    len.div_ceil(chars_per_line).max(1)
}

impl HeuristicEstimator {
    fn text_height(&self, text: &str, width_mm: f64, style: &TextStyle) -> f64 {
        estimate_lines(text, width_mm, style.size) as f64 * line_height_mm(style)
    }

    fn image_height(&self, width_mm: f64, width_px: Option<u32>, height_px: Option<u32>) -> f64 {
        match (width_px, height_px) {
            (Some(w), Some(h)) if w > 0 => {
                (width_mm * h as f64 / w as f64).clamp(IMAGE_MIN_HEIGHT_MM, IMAGE_MAX_HEIGHT_MM)
            }
            _ => IMAGE_HEIGHT_MM,
        }
    }
}

impl HeightEstimator for HeuristicEstimator {
    fn estimate(&self, block: &ContentBlock, width_mm: f64, theme: &Theme) -> f64 {
        let typo = &theme.typography;
        let body = &typo.body;
        let body_line = line_height_mm(body);

        match block {
            ContentBlock::Heading { level, text } => {
                let style = typo.heading(*level);
                self.text_height(text, width_mm, style) + BLOCK_PADDING_MM
            }
            ContentBlock::Paragraph { text, .. } => {
                self.text_height(text, width_mm, body) + BLOCK_PADDING_MM
            }
            ContentBlock::List { items, .. } => {
                let item_width = (width_mm - LIST_INDENT_MM).max(1.0);
                let items_height: f64 = items
                    .iter()
                    .map(|item| self.text_height(item, item_width, body) + LIST_ITEM_EXTRA_MM)
                    .sum();
                items_height + BLOCK_PADDING_MM
            }
            ContentBlock::Quote { text, author } => {
                let inner = (width_mm - QUOTE_INSET_MM).max(1.0);
                let lines = estimate_lines(text, inner, body.size).max(QUOTE_MIN_LINES);
                let author_line = if author.is_some() { body_line } else { 0.0 };
                lines as f64 * body_line + author_line + QUOTE_PADDING_MM
            }
            ContentBlock::Image(image) => {
                let caption = match image.caption {
                    Some(ref c) => self.text_height(c, width_mm, &typo.caption),
                    None => 0.0,
                };
                self.image_height(width_mm, image.width, image.height) + caption
            }
            ContentBlock::ImageGallery { images } => {
                let columns = gallery_columns(images.len());
                let rows = images.len().div_ceil(columns).max(1);
                (rows as f64 * GALLERY_ROW_HEIGHT_MM).min(GALLERY_HEIGHT_MM)
            }
            ContentBlock::Callout { title, text, .. } => {
                let inner = (width_mm - CALLOUT_INSET_MM).max(1.0);
                let title_height = match title {
                    Some(t) => self.text_height(t, inner, body),
                    None => 0.0,
                };
                title_height + self.text_height(text, inner, body) + CALLOUT_PADDING_MM
            }
            ContentBlock::Code { text, .. } => {
                let size = body.size * CODE_SIZE_RATIO;
                let inner = (width_mm - 2.0 * BLOCK_PADDING_MM).max(1.0);
                let lines: usize = text
                    .lines()
                    .map(|line| estimate_lines(line, inner, size))
                    .sum::<usize>()
                    .max(1);
                lines as f64 * size * PT_TO_MM * CODE_LINE_HEIGHT + 2.0 * BLOCK_PADDING_MM
            }
            ContentBlock::Table { headers, rows } => {
                let columns = rows
                    .iter()
                    .map(Vec::len)
                    .chain(headers.iter().map(Vec::len))
                    .max()
                    .unwrap_or(1)
                    .max(1);
                let cell_width = (width_mm / columns as f64 - 2.0 * TABLE_CELL_PADDING_MM).max(1.0);
                let row_height = |cells: &[String]| {
                    let lines = cells
                        .iter()
                        .map(|c| estimate_lines(c, cell_width, body.size))
                        .max()
                        .unwrap_or(1);
                    lines as f64 * body_line + 2.0 * TABLE_CELL_PADDING_MM
                };
                let header_height = headers.as_deref().map(row_height).unwrap_or(0.0);
                let body_height: f64 = if rows.is_empty() {
                    // Room for the "empty table" placeholder.
                    body_line + 2.0 * TABLE_CELL_PADDING_MM
                } else {
                    rows.iter().map(|r| row_height(r)).sum()
                };
                header_height + body_height + BLOCK_PADDING_MM
            }
            ContentBlock::Separator => SEPARATOR_HEIGHT_MM,
        }
    }
}
