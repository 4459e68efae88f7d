//! # Pageflow
//!
//! Turns article markup into a paginated, themed PDF without a native layout
//! engine.
//!
//! There is no browser and no box model here. Block heights are estimated
//! from real font metrics, blocks are flowed greedily onto fixed-size pages,
//! each page is painted to a raster image at the target DPI, and the images
//! become the pages of the PDF. Pagination is heuristic but deterministic:
//! the same article and options always produce the same pages.
//!
//! ## Architecture
//!
//! ```text
//! Article (JSON/API)
//!       ↓
//!   [content]  — Markup → semantic content blocks
//!       ↓
//!   [layout]   — Height estimation, greedy flow onto pages
//!       ↓
//!   [model]    — Document: pages, positioned blocks, themes by name
//!       ↓
//!   [render]   — Paint each page at a DPI (fonts, text, images)
//!       ↓
//!   [pdf]      — One full-page image per PDF page
//! ```
//!
//! [`export::ExportService`] runs the whole pipeline; [`export()`] is the
//! one-call version.

pub mod config;
pub mod content;
pub mod error;
pub mod export;
pub mod font;
pub mod image;
pub mod layout;
pub mod model;
pub mod pdf;
pub mod render;
pub mod text;
pub mod theme;

pub use config::ExportOptions;
pub use error::ExportError;
pub use export::{ExportResult, ExportService};
pub use layout::Article;
pub use model::Document;

/// Export an article described as JSON to PDF bytes.
///
/// This is the primary entry point. Options are validated first; unknown
/// themes fall back to the default one.
pub fn export(article_json: &str, options: ExportOptions) -> Result<ExportResult, ExportError> {
    let article = Article::from_json(article_json)?;
    ExportService::new(options)?.export(&article)
}

/// Lay out an article described as JSON without rendering it.
pub fn layout_json(article_json: &str, options: ExportOptions) -> Result<Document, ExportError> {
    let article = Article::from_json(article_json)?;
    Ok(ExportService::new(options)?.layout(&article))
}
