//! # Layout
//!
//! Flows content blocks onto fixed-size pages.
//!
//! There is no measuring layout engine underneath. Each block's height is
//! estimated up front ([`estimate`]) and blocks are placed greedily top to
//! bottom. When a block does not look like it fits, [`page_break`] decides
//! whether it starts the next page. Blocks are never split: an estimate
//! taller than the page is clamped to the usable height, and every height is
//! clamped so a block never runs past the bottom margin.
//!
//! Pages are opened lazily, when the first block that needs them arrives, so
//! a flow never ends on an empty page.
//!
//! Flow is deterministic. The same blocks, theme and format always produce
//! the same page count and geometry; only ids differ between runs.

pub mod estimate;
mod importer;
pub mod page_break;

pub use estimate::{HeightEstimator, HeuristicEstimator};
pub use importer::{
    Article, ArticleSection, ImportOptions, Importer, Recommendation, RouteMap, RouteMeta,
};

use crate::content::{gallery_columns, ContentBlock};
use crate::model::{
    BlockContent, BlockPosition, Document, DocumentBuilder, ImageFit, Margins, Orientation,
    PageBackground, PageFormat, PageKind, PositionedBlock, Rect,
};
use crate::theme::Theme;
use page_break::{decide_break, BreakDecision, BreakRules, Candidate, PageState};

/// Greedy page flow over a swappable height estimator.
#[derive(Debug, Clone)]
pub struct FlowEngine<E = HeuristicEstimator> {
    estimator: E,
    rules: BreakRules,
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEngine {
    pub fn new() -> Self {
        Self::with_estimator(HeuristicEstimator)
    }
}

/// A page being filled.
struct PageDraft {
    blocks: Vec<PositionedBlock>,
    /// Cursor, in page millimetres.
    y: f64,
    /// Too little space is left; the next block opens a new page.
    exhausted: bool,
}

impl PageDraft {
    fn new(top: f64) -> Self {
        Self {
            blocks: Vec::new(),
            y: top,
            exhausted: false,
        }
    }

    fn state(&self, area: &Rect) -> PageState {
        PageState {
            offset: self.y - area.y,
            remaining: area.bottom() - self.y,
        }
    }
}

impl<E: HeightEstimator> FlowEngine<E> {
    pub fn with_estimator(estimator: E) -> Self {
        Self {
            estimator,
            rules: BreakRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: BreakRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &BreakRules {
        &self.rules
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Lay out body blocks: a cover page first, then as many content pages
    /// as the blocks need. The cover is created even when `blocks` is empty.
    pub fn layout(
        &self,
        blocks: &[ContentBlock],
        theme: &Theme,
        format: PageFormat,
        orientation: Orientation,
    ) -> Document {
        let mut builder = DocumentBuilder::new("Untitled", &theme.name, format, orientation);
        builder.push_page(
            PageKind::Cover,
            Margins::uniform(theme.spacing.page_padding),
            Some(cover_background(theme)),
            Vec::new(),
        );
        self.flow(&mut builder, blocks, theme, PageKind::Content);
        builder.build()
    }

    /// Flow `blocks` onto new pages of `kind` appended to `builder`, always
    /// starting on a fresh page. Returns the number of pages added.
    pub fn flow(
        &self,
        builder: &mut DocumentBuilder,
        blocks: &[ContentBlock],
        theme: &Theme,
        kind: PageKind,
    ) -> usize {
        let doc = builder.document();
        let (page_w, page_h) = doc.page_format.dimensions_mm(doc.orientation);
        let margins = Margins::uniform(theme.spacing.page_padding);
        let area = margins.content_area(page_w, page_h);
        let spacing = theme.spacing.block_spacing;

        if area.width <= 0.0 || area.height <= 0.0 {
            log::warn!(
                "page {}x{}mm has no room inside {}mm margins; nothing flowed",
                page_w,
                page_h,
                theme.spacing.page_padding
            );
            return 0;
        }

        let heights: Vec<f64> = blocks
            .iter()
            .map(|b| self.estimator.estimate(b, area.width, theme))
            .collect();

        let mut pages: Vec<Vec<PositionedBlock>> = Vec::new();
        let mut current: Option<PageDraft> = None;

        for (i, block) in blocks.iter().enumerate() {
            let estimate = heights[i];
            if estimate.is_nan() || estimate <= 0.0 {
                log::debug!("skipping {} block with no height", block.kind());
                continue;
            }

            let is_heading = matches!(block, ContentBlock::Heading { .. });
            let candidate = Candidate {
                height: estimate,
                is_heading,
                is_section_heading: matches!(block, ContentBlock::Heading { level: 2, .. }),
                next_height: heights[i + 1..].iter().copied().find(|h| *h > 0.0),
                spacing,
            };

            let needs_page = match &current {
                None => true,
                Some(draft) => {
                    draft.exhausted
                        || decide_break(&draft.state(&area), &candidate, &self.rules)
                            == BreakDecision::MoveToNextPage
                }
            };
            if needs_page {
                if let Some(done) = current.replace(PageDraft::new(area.y)) {
                    pages.push(done.blocks);
                }
            }
            let draft = current.get_or_insert_with(|| PageDraft::new(area.y));

            let mut height = estimate;
            if height > area.height {
                log::warn!(
                    "{} block estimated at {:.1}mm exceeds usable page height {:.1}mm; clamped",
                    block.kind(),
                    height,
                    area.height
                );
                height = area.height;
            }
            height = height.min(area.bottom() - draft.y);

            log::debug!(
                "page {}: {} at y={:.1}mm h={:.1}mm",
                pages.len() + 1,
                block.kind(),
                draft.y,
                height
            );
            draft.blocks.push(PositionedBlock::new(
                BlockPosition::mm(area.x, draft.y, area.width, height),
                to_block_content(block),
            ));
            draft.y += height + spacing;
            draft.exhausted = area.bottom() - draft.y < self.rules.min_remaining;
        }

        if let Some(done) = current {
            pages.push(done.blocks);
        }

        let count = pages.len();
        for blocks in pages {
            builder.push_page(kind, margins, None, blocks);
        }
        log::debug!("flowed {} blocks onto {} {:?} pages", blocks.len(), count, kind);
        count
    }
}

/// Convert a parsed block into positioned-block content.
pub fn to_block_content(block: &ContentBlock) -> BlockContent {
    match block {
        ContentBlock::Heading { level, text } => BlockContent::Heading {
            level: *level,
            text: text.clone(),
        },
        ContentBlock::Paragraph { text, .. } => BlockContent::Paragraph { text: text.clone() },
        ContentBlock::List { ordered, items } => BlockContent::List {
            ordered: *ordered,
            items: items.clone(),
        },
        ContentBlock::Quote { text, author } => BlockContent::Quote {
            text: text.clone(),
            author: author.clone(),
        },
        ContentBlock::Image(image) => BlockContent::Image {
            url: image.url.clone(),
            alt: image.alt.clone(),
            caption: image.caption.clone(),
            fit: ImageFit::Contain,
        },
        ContentBlock::ImageGallery { images } => BlockContent::Gallery {
            images: images.clone(),
            columns: gallery_columns(images.len()),
        },
        ContentBlock::Callout {
            variant,
            title,
            text,
        } => BlockContent::Callout {
            variant: *variant,
            title: title.clone(),
            text: text.clone(),
        },
        ContentBlock::Code { text, language } => BlockContent::Code {
            text: text.clone(),
            language: language.clone(),
        },
        ContentBlock::Table { headers, rows } => BlockContent::Table {
            headers: headers.clone(),
            rows: rows.clone(),
        },
        ContentBlock::Separator => BlockContent::Divider,
    }
}

/// The cover background for a theme: its cover color under the cover gradient.
pub fn cover_background(theme: &Theme) -> PageBackground {
    PageBackground {
        color: Some(theme.colors.cover.background),
        gradient: Some(theme.colors.cover.gradient),
        image: None,
    }
}
