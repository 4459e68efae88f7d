//! # Page Rendering
//!
//! Rasterizes one [`Page`] of a laid-out document into an encoded PNG or
//! JPEG image.
//!
//! The canvas is set up in millimetre user space (`dpi / 25.4` pixels per
//! millimetre). Drawing order is fixed: the theme background, the page
//! background (color, image, gradient), then every visible block in the
//! order it appears on the page. Each block draws inside a [`CanvasScope`],
//! so its rotation, scale, opacity and clip never leak into the next block.
//!
//! A block that fails to draw is logged and replaced with a placeholder;
//! the rest of the page still renders. Unavailable images get a neutral box
//! labelled "Image unavailable".

pub mod canvas;
pub mod glyphs;
pub mod raster;

pub use canvas::{Canvas, CanvasScope, Paint, Path, Transform};
pub use raster::RasterCanvas;

use crate::error::RenderError;
use crate::font::FontContext;
use crate::image::{fit_within, ImageFormat, ImageService};
use crate::layout::estimate::{
    line_height_mm, BLOCK_PADDING_MM, CALLOUT_INSET_MM, CALLOUT_PADDING_MM, CODE_LINE_HEIGHT,
    CODE_SIZE_RATIO, LIST_INDENT_MM, LIST_ITEM_EXTRA_MM, PT_TO_MM, QUOTE_INSET_MM,
    TABLE_CELL_PADDING_MM,
};
use crate::model::{
    BlockContent, BlockStyle, ImageFit, Page, PositionedBlock, Rect, TextAlign, TextRole,
};
use crate::text::{FontSpec, TextLayout};
use crate::theme::{CalloutColors, Color, TextStyle, Theme};
use crate::content::CalloutVariant;
use glyphs::GlyphPainter;
use image::DynamicImage;
use std::sync::Arc;

pub const MM_PER_INCH: f64 = 25.4;

pub const IMAGE_UNAVAILABLE: &str = "Image unavailable";
pub const CONTENT_UNAVAILABLE: &str = "Content unavailable";
pub const EMPTY_TABLE: &str = "Empty table";

const PLACEHOLDER_FILL: &str = "#f0f0f0";
const PLACEHOLDER_TEXT: &str = "#999999";
const GALLERY_GAP_MM: f64 = 2.0;
const ACCENT_BAR_MM: f64 = 1.0;
const CALLOUT_RADIUS_MM: f64 = 2.0;
const RULE_WIDTH_MM: f64 = 0.3;
const GRID_WIDTH_MM: f64 = 0.2;
/// Opacity of the cover gradient laid over a cover photo.
const COVER_SCRIM_OPACITY: f64 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub format: ImageFormat,
    /// JPEG quality, 1-100.
    pub quality: u8,
    /// Downscale decoded images to the pixels they cover before drawing.
    pub optimize_images: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: 90,
            optimize_images: true,
        }
    }
}

/// One page as an encoded image.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_id: String,
    /// 1-based, as on the page.
    pub page_index: usize,
    pub image_data: Vec<u8>,
    pub format: ImageFormat,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub dpi: u32,
}

/// Resolved text parameters for one run.
#[derive(Debug, Clone, Copy)]
struct TextRun<'a> {
    family: &'a str,
    size: f64,
    weight: u32,
    italic: bool,
    line_height: f64,
    color: Color,
    align: TextAlign,
}

impl<'a> TextRun<'a> {
    fn new(base: &TextStyle, family: &'a str, color: Color) -> Self {
        Self {
            family,
            size: base.size,
            weight: base.weight,
            italic: false,
            line_height: base.line_height,
            color,
            align: TextAlign::Left,
        }
    }

    /// Apply a block's typography overrides.
    fn styled(mut self, style: &BlockStyle) -> Self {
        self.size = style.font_size.filter(|s| *s > 0.0).unwrap_or(self.size);
        self.weight = style.font_weight.unwrap_or(self.weight);
        self.italic |= style.italic;
        self.line_height = style.line_height.filter(|l| *l > 0.0).unwrap_or(self.line_height);
        self.color = style.color.unwrap_or(self.color);
        self.align = style.align;
        self
    }

    fn font(&self) -> FontSpec<'a> {
        FontSpec::new(self.family, self.size)
            .weight(self.weight)
            .italic(self.italic)
    }

    /// Line advance in millimetres.
    fn advance(&self) -> f64 {
        self.size * PT_TO_MM * self.line_height
    }
}

pub struct PageRenderer {
    fonts: FontContext,
    images: Arc<ImageService>,
    text: TextLayout,
    options: RenderOptions,
}

impl PageRenderer {
    pub fn new(images: Arc<ImageService>) -> Self {
        Self {
            fonts: FontContext::new(),
            images,
            text: TextLayout::new(),
            options: RenderOptions::default(),
        }
    }

    pub fn with_fonts(mut self, fonts: FontContext) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fonts(&self) -> &FontContext {
        &self.fonts
    }

    pub fn images(&self) -> &Arc<ImageService> {
        &self.images
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render and encode one page.
    pub fn render_page(
        &self,
        page: &Page,
        theme: &Theme,
        dpi: u32,
    ) -> Result<RenderedPage, RenderError> {
        let canvas = self.paint(page, theme, dpi)?;
        let (pixel_width, pixel_height) = canvas.size();
        let pixels = DynamicImage::ImageRgba8(canvas.into_image());
        let image_data = crate::image::encode(&pixels, self.options.format, self.options.quality)
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        log::debug!(
            "rendered page {} ({} blocks) at {}x{} px, {} bytes",
            page.index,
            page.blocks.len(),
            pixel_width,
            pixel_height,
            image_data.len()
        );

        Ok(RenderedPage {
            page_id: page.id.clone(),
            page_index: page.index,
            image_data,
            format: self.options.format,
            pixel_width,
            pixel_height,
            dpi,
        })
    }

    /// Draw a page onto a fresh canvas without encoding it.
    pub fn paint(&self, page: &Page, theme: &Theme, dpi: u32) -> Result<RasterCanvas, RenderError> {
        let (width_mm, height_mm) = page.size_mm();
        if dpi == 0 || !(width_mm > 0.0 && height_mm > 0.0) {
            return Err(RenderError::Geometry {
                block_id: page.id.clone(),
                width: width_mm,
                height: height_mm,
            });
        }
        let px_per_mm = dpi as f64 / MM_PER_INCH;
        let pixel_width = ((width_mm * px_per_mm).round() as u32).max(1);
        let pixel_height = ((height_mm * px_per_mm).round() as u32).max(1);

        let mut raster = RasterCanvas::new(pixel_width, pixel_height, theme.colors.background);
        raster.transform(&Transform::scale(px_per_mm, px_per_mm));
        // Percent geometry follows the canvas actually allocated.
        let live = (pixel_width as f64 / px_per_mm, pixel_height as f64 / px_per_mm);

        let canvas: &mut dyn Canvas = &mut raster;
        self.draw_background(canvas, page, live);
        for block in page.blocks.iter().filter(|b| !b.style.hidden) {
            self.draw_positioned(canvas, block, theme, live);
        }
        Ok(raster)
    }

    fn draw_background(&self, canvas: &mut dyn Canvas, page: &Page, live: (f64, f64)) {
        let Some(background) = &page.background else {
            return;
        };
        let full = Rect {
            x: 0.0,
            y: 0.0,
            width: live.0,
            height: live.1,
        };
        if let Some(color) = background.color {
            canvas.fill_path(&Path::rect(0.0, 0.0, live.0, live.1), &Paint::Solid(color));
        }
        let has_image = match background.image.as_deref() {
            Some(url) => match self.draw_picture(canvas, url, full, ImageFit::Cover) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("page {} background image skipped: {}", page.index, e);
                    false
                }
            },
            None => false,
        };
        if let Some(stops) = background.gradient {
            let mut scope = CanvasScope::new(canvas);
            if has_image {
                scope.set_opacity(COVER_SCRIM_OPACITY);
            }
            scope.fill_path(
                &Path::rect(0.0, 0.0, live.0, live.1),
                &Paint::LinearGradient {
                    from: (0.0, 0.0),
                    to: (0.0, live.1),
                    stops,
                },
            );
        }
    }

    fn draw_positioned(
        &self,
        canvas: &mut dyn Canvas,
        block: &PositionedBlock,
        theme: &Theme,
        live: (f64, f64),
    ) {
        let rect = block.position.to_mm(live.0, live.1);
        if !valid_rect(&rect) {
            let err = RenderError::Geometry {
                block_id: block.id.clone(),
                width: rect.width,
                height: rect.height,
            };
            log::warn!("skipping block: {}", err);
            return;
        }

        let style = &block.style;
        let mut scope = CanvasScope::new(canvas);
        let scale = if style.scale.is_finite() && style.scale > 0.0 {
            style.scale
        } else {
            1.0
        };
        let rotation = if style.rotation.is_finite() { style.rotation } else { 0.0 };
        if rotation != 0.0 || scale != 1.0 {
            let (cx, cy) = (rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
            let around_center = Transform::translate(cx, cy)
                .then(&Transform::rotate_degrees(rotation))
                .then(&Transform::scale(scale, scale))
                .then(&Transform::translate(-cx, -cy));
            scope.transform(&around_center);
        }
        if style.opacity.is_finite() {
            scope.set_opacity(style.opacity);
        }

        if let Err(e) = self.draw_block(&mut *scope, block, rect, theme) {
            log::warn!("block '{}' ({}) failed to render: {}", block.id, block.kind(), e);
            let label = match e {
                RenderError::Image(_) => IMAGE_UNAVAILABLE,
                _ => CONTENT_UNAVAILABLE,
            };
            self.draw_placeholder(&mut *scope, rect, label, theme);
        }
    }

    fn draw_block(
        &self,
        canvas: &mut dyn Canvas,
        block: &PositionedBlock,
        rect: Rect,
        theme: &Theme,
    ) -> Result<(), RenderError> {
        self.draw_chrome(canvas, &block.style, rect);
        canvas.clip_rect(rect.x, rect.y, rect.width, rect.height);

        let inner = inset(rect, block.style.padding.unwrap_or(0.0).max(0.0));
        if !valid_rect(&inner) {
            return Err(RenderError::Geometry {
                block_id: block.id.clone(),
                width: inner.width,
                height: inner.height,
            });
        }

        let typo = &theme.typography;
        let colors = &theme.colors;
        let style = &block.style;

        match &block.content {
            BlockContent::Heading { level, text } => {
                let run = TextRun::new(typo.heading(*level), &typo.heading_font, colors.text)
                    .styled(style);
                self.draw_text(canvas, text, inner.x, inner.y, inner.width, &run);
            }
            BlockContent::Paragraph { text } => {
                let run = TextRun::new(&typo.body, &typo.body_font, colors.text).styled(style);
                self.draw_text(canvas, text, inner.x, inner.y, inner.width, &run);
            }
            BlockContent::Text { text, role } => {
                let cover = &colors.cover;
                let run = match role {
                    TextRole::Title => TextRun::new(&typo.h1, &typo.heading_font, cover.text),
                    TextRole::Subtitle => {
                        TextRun::new(&typo.h3, &typo.body_font, cover.text_secondary)
                    }
                    TextRole::Byline => {
                        TextRun::new(&typo.small, &typo.body_font, cover.text_secondary)
                    }
                    TextRole::TocEntry | TextRole::Body => {
                        TextRun::new(&typo.body, &typo.body_font, colors.text)
                    }
                    TextRole::Label => {
                        TextRun::new(&typo.caption, &typo.body_font, colors.text_muted)
                    }
                }
                .styled(style);
                self.draw_text(canvas, text, inner.x, inner.y, inner.width, &run);
            }
            BlockContent::List { ordered, items } => {
                let run = TextRun::new(&typo.body, &typo.body_font, colors.text).styled(style);
                self.draw_list(canvas, *ordered, items, inner, &run, colors.accent);
            }
            BlockContent::Quote { text, author } => {
                canvas.fill_path(
                    &Path::rect(inner.x, inner.y, ACCENT_BAR_MM, inner.height),
                    &Paint::Solid(colors.accent),
                );
                let mut run =
                    TextRun::new(&typo.body, &typo.body_font, colors.text_secondary).styled(style);
                run.italic = true;
                let x = inner.x + QUOTE_INSET_MM;
                let width = (inner.width - QUOTE_INSET_MM).max(1.0);
                let y = inner.y + BLOCK_PADDING_MM;
                let used = self.draw_text(canvas, text, x, y, width, &run);
                if let Some(author) = author {
                    let byline = TextRun::new(&typo.small, &typo.body_font, colors.text_muted);
                    self.draw_text(
                        canvas,
                        &format!("\u{2014} {}", author),
                        x,
                        y + used + typo.body.margin_bottom.min(BLOCK_PADDING_MM),
                        width,
                        &byline,
                    );
                }
            }
            BlockContent::Callout { variant, title, text } => {
                let palette = callout_colors(theme, *variant);
                canvas.fill_path(
                    &Path::rounded_rect(
                        inner.x,
                        inner.y,
                        inner.width,
                        inner.height,
                        CALLOUT_RADIUS_MM,
                    ),
                    &Paint::Solid(palette.background),
                );
                canvas.fill_path(
                    &Path::rect(inner.x, inner.y, ACCENT_BAR_MM, inner.height),
                    &Paint::Solid(palette.border),
                );
                let x = inner.x + CALLOUT_INSET_MM / 2.0;
                let width = (inner.width - CALLOUT_INSET_MM).max(1.0);
                let mut y = inner.y + CALLOUT_PADDING_MM / 4.0;
                let mut heading = TextRun::new(&typo.body, &typo.body_font, palette.text);
                heading.weight = 700;
                let label = title.as_deref().unwrap_or(variant.label());
                y += self.draw_text(canvas, label, x, y, width, &heading);
                let body = TextRun::new(&typo.body, &typo.body_font, palette.text).styled(style);
                self.draw_text(canvas, text, x, y, width, &body);
            }
            BlockContent::Code { text, .. } => {
                canvas.fill_path(
                    &Path::rounded_rect(
                        inner.x,
                        inner.y,
                        inner.width,
                        inner.height,
                        theme.blocks.border_radius,
                    ),
                    &Paint::Solid(colors.surface),
                );
                let mut run = TextRun::new(&typo.body, &typo.mono_font, colors.text).styled(style);
                run.size = style.font_size.unwrap_or(typo.body.size * CODE_SIZE_RATIO);
                run.line_height = CODE_LINE_HEIGHT;
                let pad = BLOCK_PADDING_MM / 2.0;
                let width = (inner.width - 2.0 * pad).max(1.0);
                self.draw_text(canvas, text, inner.x + pad, inner.y + pad, width, &run);
            }
            BlockContent::Image { url, caption, fit, .. } => {
                let caption_run = TextRun {
                    align: TextAlign::Center,
                    ..TextRun::new(&typo.caption, &typo.body_font, colors.text_muted)
                };
                let caption_height = match caption {
                    Some(c) if !c.is_empty() => {
                        caption_run.advance() + theme.spacing.element_spacing
                    }
                    _ => 0.0,
                };
                let area = Rect {
                    height: (inner.height - caption_height).max(1.0),
                    ..inner
                };
                if let Err(e) = self.draw_picture(canvas, url, area, *fit) {
                    log::warn!("image block '{}': {}", block.id, e);
                    self.draw_placeholder(canvas, area, IMAGE_UNAVAILABLE, theme);
                }
                if let Some(caption) = caption.as_deref().filter(|c| !c.is_empty()) {
                    let y = area.bottom() + theme.spacing.element_spacing;
                    self.draw_text(canvas, caption, inner.x, y, inner.width, &caption_run);
                }
            }
            BlockContent::Gallery { images, columns } => {
                if images.is_empty() {
                    return Ok(());
                }
                let cols = (*columns).clamp(1, images.len());
                let rows = images.len().div_ceil(cols);
                let cell_w = (inner.width - GALLERY_GAP_MM * (cols - 1) as f64) / cols as f64;
                let cell_h = (inner.height - GALLERY_GAP_MM * (rows - 1) as f64) / rows as f64;
                for (i, img) in images.iter().enumerate() {
                    let cell = Rect {
                        x: inner.x + (i % cols) as f64 * (cell_w + GALLERY_GAP_MM),
                        y: inner.y + (i / cols) as f64 * (cell_h + GALLERY_GAP_MM),
                        width: cell_w,
                        height: cell_h,
                    };
                    if !valid_rect(&cell) {
                        continue;
                    }
                    if let Err(e) = self.draw_picture(canvas, &img.url, cell, ImageFit::Cover) {
                        log::warn!("gallery '{}' image {}: {}", block.id, i + 1, e);
                        self.draw_placeholder(canvas, cell, IMAGE_UNAVAILABLE, theme);
                    }
                }
            }
            BlockContent::Table { headers, rows } => {
                self.draw_table(canvas, headers.as_deref(), rows, inner, theme);
            }
            BlockContent::Divider => {
                let y = inner.y + inner.height / 2.0;
                let rule = Path::line(inner.x, y, inner.right(), y);
                canvas.stroke_path(&rule, colors.border, RULE_WIDTH_MM);
            }
            BlockContent::Map {
                image_url,
                points,
                description,
            } => {
                self.draw_map(
                    canvas,
                    image_url.as_deref(),
                    points,
                    description.as_deref(),
                    inner,
                    theme,
                );
            }
            BlockContent::Spacer => {}
        }
        Ok(())
    }

    /// Background fill, background image and border.
    fn draw_chrome(&self, canvas: &mut dyn Canvas, style: &BlockStyle, rect: Rect) {
        let radius = style.border_radius.unwrap_or(0.0).max(0.0);
        let shape = Path::rounded_rect(rect.x, rect.y, rect.width, rect.height, radius);
        if let Some(color) = style.background_color {
            canvas.fill_path(&shape, &Paint::Solid(color));
        }
        if let Some(url) = style.background_image.as_deref() {
            if let Err(e) = self.draw_picture(canvas, url, rect, ImageFit::Cover) {
                log::warn!("block background image skipped: {}", e);
            }
        }
        if let (Some(color), Some(width)) = (style.border_color, style.border_width) {
            if width > 0.0 {
                canvas.stroke_path(&shape, color, width);
            }
        }
    }

    /// Wrap and draw `text` from the top-left corner. Returns the height used.
    fn draw_text(
        &self,
        canvas: &mut dyn Canvas,
        text: &str,
        x: f64,
        y: f64,
        width: f64,
        run: &TextRun,
    ) -> f64 {
        if text.is_empty() {
            return 0.0;
        }
        let font = run.font();
        let lines = self
            .text
            .break_into_lines(&self.fonts, text, (width / PT_TO_MM).max(1.0), &font);
        let advance = run.advance();
        let (ascent, descent) = self
            .fonts
            .vertical_metrics(run.family, run.weight, run.italic, run.size);
        let (ascent, descent) = (ascent * PT_TO_MM, descent * PT_TO_MM);
        let lead = (advance - (ascent + descent)) / 2.0;

        let painter = GlyphPainter::new(&self.fonts);
        for (i, line) in lines.iter().enumerate() {
            let line_width = line.width * PT_TO_MM;
            let lx = match run.align {
                TextAlign::Left => x,
                TextAlign::Center => x + (width - line_width) / 2.0,
                TextAlign::Right => x + width - line_width,
            };
            let baseline = y + i as f64 * advance + lead + ascent;
            painter.draw_line(canvas, line, lx, baseline, &font, run.color);
        }
        lines.len() as f64 * advance
    }

    fn draw_list(
        &self,
        canvas: &mut dyn Canvas,
        ordered: bool,
        items: &[String],
        inner: Rect,
        run: &TextRun,
        bullet: Color,
    ) {
        let text_x = inner.x + LIST_INDENT_MM;
        let text_w = (inner.width - LIST_INDENT_MM).max(1.0);
        let mut y = inner.y;
        for (i, item) in items.iter().enumerate() {
            if y >= inner.bottom() {
                break;
            }
            if ordered {
                let marker = TextRun {
                    align: TextAlign::Left,
                    ..*run
                };
                self.draw_text(canvas, &format!("{}.", i + 1), inner.x, y, LIST_INDENT_MM, &marker);
            } else {
                let r = run.size * PT_TO_MM * 0.18;
                canvas.fill_path(
                    &Path::ellipse(inner.x + LIST_INDENT_MM / 3.0, y + run.advance() / 2.0, r, r),
                    &Paint::Solid(bullet),
                );
            }
            y += self.draw_text(canvas, item, text_x, y, text_w, run) + LIST_ITEM_EXTRA_MM;
        }
    }

    fn draw_table(
        &self,
        canvas: &mut dyn Canvas,
        headers: Option<&[String]>,
        rows: &[Vec<String>],
        inner: Rect,
        theme: &Theme,
    ) {
        let colors = &theme.colors;
        let typo = &theme.typography;
        let columns = rows
            .iter()
            .map(Vec::len)
            .chain(headers.map(<[String]>::len))
            .max()
            .unwrap_or(0);

        if columns == 0 {
            canvas.stroke_path(
                &Path::rect(inner.x, inner.y, inner.width, inner.height),
                colors.border,
                GRID_WIDTH_MM,
            );
            let run = TextRun {
                align: TextAlign::Center,
                ..TextRun::new(&typo.body, &typo.body_font, colors.text_muted)
            };
            let y = inner.y + (inner.height - run.advance()) / 2.0;
            self.draw_text(canvas, EMPTY_TABLE, inner.x, y, inner.width, &run);
            return;
        }

        let row_h = line_height_mm(&typo.body) + 2.0 * TABLE_CELL_PADDING_MM;
        let col_w = inner.width / columns as f64;
        let body = TextRun::new(&typo.body, &typo.body_font, colors.text);
        let mut y = inner.y;

        let draw_row = |canvas: &mut dyn Canvas, cells: &[String], y: f64, run: &TextRun| {
            for (c, cell) in cells.iter().enumerate() {
                let x = inner.x + c as f64 * col_w;
                let mut scope = CanvasScope::new(&mut *canvas);
                scope.clip_rect(x, y, col_w, row_h);
                self.draw_text(
                    &mut *scope,
                    cell,
                    x + TABLE_CELL_PADDING_MM,
                    y + TABLE_CELL_PADDING_MM,
                    (col_w - 2.0 * TABLE_CELL_PADDING_MM).max(1.0),
                    run,
                );
            }
        };

        if let Some(headers) = headers {
            let band = Path::rect(inner.x, y, inner.width, row_h);
            canvas.fill_path(&band, &Paint::Solid(colors.surface));
            let mut bold = body;
            bold.weight = 700;
            draw_row(canvas, headers, y, &bold);
            y += row_h;
        }
        for (r, row) in rows.iter().enumerate() {
            if y >= inner.bottom() {
                break;
            }
            if r % 2 == 1 {
                let band = Path::rect(inner.x, y, inner.width, row_h);
                canvas.fill_path(&band, &Paint::Solid(colors.surface_alt));
            }
            draw_row(canvas, row, y, &body);
            y += row_h;
        }

        let bottom = y.min(inner.bottom());
        let mut grid = Path::new();
        let mut line_y = inner.y;
        while line_y <= bottom + 1e-9 {
            grid.move_to(inner.x, line_y).line_to(inner.right(), line_y);
            line_y += row_h;
        }
        for c in 0..=columns {
            let x = inner.x + c as f64 * col_w;
            grid.move_to(x, inner.y).line_to(x, bottom);
        }
        canvas.stroke_path(&grid, colors.border, GRID_WIDTH_MM);
    }

    fn draw_map(
        &self,
        canvas: &mut dyn Canvas,
        image_url: Option<&str>,
        points: &[String],
        description: Option<&str>,
        inner: Rect,
        theme: &Theme,
    ) {
        let typo = &theme.typography;
        let run = TextRun::new(&typo.body, &typo.body_font, theme.colors.text);
        let gap = theme.spacing.block_spacing;

        let description_lines = description.map_or(0, |d| {
            self.text
                .break_into_lines(&self.fonts, d, (inner.width / PT_TO_MM).max(1.0), &run.font())
                .len()
        });
        let text_height = (points.len() + description_lines) as f64 * run.advance()
            + if description_lines > 0 { gap } else { 0.0 };

        let mut y = inner.y;
        if let Some(url) = image_url {
            let image_height = (inner.height - text_height - gap).max(inner.height * 0.4);
            let area = Rect {
                height: image_height,
                ..inner
            };
            if let Err(e) = self.draw_picture(canvas, url, area, ImageFit::Contain) {
                log::warn!("map image: {}", e);
                self.draw_placeholder(canvas, area, IMAGE_UNAVAILABLE, theme);
            }
            y += image_height + gap;
        }
        for (i, point) in points.iter().enumerate() {
            let entry = format!("{}. {}", i + 1, point);
            y += self.draw_text(canvas, &entry, inner.x, y, inner.width, &run);
        }
        if let Some(description) = description {
            let muted = TextRun {
                color: theme.colors.text_secondary,
                ..run
            };
            self.draw_text(canvas, description, inner.x, y + gap, inner.width, &muted);
        }
    }

    /// Load an image and draw it into `area` with the given fit.
    fn draw_picture(
        &self,
        canvas: &mut dyn Canvas,
        url: &str,
        area: Rect,
        fit: ImageFit,
    ) -> Result<(), RenderError> {
        let image = self.images.load(url)?;
        let (iw, ih) = (image.width() as f64, image.height() as f64);
        if iw <= 0.0 || ih <= 0.0 {
            return Err(crate::error::ImageError::Decode("image has no pixels".to_string()).into());
        }
        let scale = match fit {
            ImageFit::Contain => (area.width / iw).min(area.height / ih),
            ImageFit::Cover => (area.width / iw).max(area.height / ih),
        };
        let (w, h) = (iw * scale, ih * scale);
        let x = area.x + (area.width - w) / 2.0;
        let y = area.y + (area.height - h) / 2.0;

        let px_per_unit = canvas.current_transform().mean_scale();
        let target_w = ((w * px_per_unit).ceil() as u32).max(1);
        let target_h = ((h * px_per_unit).ceil() as u32).max(1);
        let pixels = match self.options.optimize_images {
            true => fit_within(&image, target_w, target_h).map(|small| small.to_rgba8()),
            false => None,
        }
        .unwrap_or_else(|| image.to_rgba8());

        let mut scope = CanvasScope::new(canvas);
        scope.clip_rect(area.x, area.y, area.width, area.height);
        scope.draw_image(&pixels, x, y, w, h);
        Ok(())
    }

    fn draw_placeholder(&self, canvas: &mut dyn Canvas, rect: Rect, label: &str, theme: &Theme) {
        canvas.fill_path(
            &Path::rect(rect.x, rect.y, rect.width, rect.height),
            &Paint::Solid(Color::hex(PLACEHOLDER_FILL)),
        );
        let run = TextRun {
            align: TextAlign::Center,
            ..TextRun::new(
                &theme.typography.caption,
                &theme.typography.body_font,
                Color::hex(PLACEHOLDER_TEXT),
            )
        };
        let y = rect.y + (rect.height - run.advance()).max(0.0) / 2.0;
        self.draw_text(canvas, label, rect.x, y, rect.width, &run);
    }
}

fn callout_colors(theme: &Theme, variant: CalloutVariant) -> &CalloutColors {
    match variant {
        CalloutVariant::Info => &theme.colors.info,
        CalloutVariant::Warning => &theme.colors.warning,
        CalloutVariant::Tip => &theme.colors.tip,
        CalloutVariant::Danger => &theme.colors.danger,
    }
}

fn valid_rect(rect: &Rect) -> bool {
    rect.x.is_finite()
        && rect.y.is_finite()
        && rect.width.is_finite()
        && rect.height.is_finite()
        && rect.width > 0.0
        && rect.height > 0.0
}

fn inset(rect: Rect, by: f64) -> Rect {
    Rect {
        x: rect.x + by,
        y: rect.y + by,
        width: rect.width - 2.0 * by,
        height: rect.height - 2.0 * by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{LocalFetcher, ProxyConfig};
    use crate::model::{BlockPosition, Margins, Orientation, PageBackground, PageFormat, PageKind};
    use crate::theme::get_theme_config;

    fn renderer() -> PageRenderer {
        let images = ImageService::with_fetcher(ProxyConfig::default(), Arc::new(LocalFetcher));
        PageRenderer::new(Arc::new(images))
    }

    fn page(blocks: Vec<PositionedBlock>) -> Page {
        Page {
            id: "p1".to_string(),
            index: 1,
            kind: PageKind::Content,
            format: PageFormat::A5,
            orientation: Orientation::Portrait,
            blocks,
            background: None,
            margins: Margins::default(),
        }
    }

    fn png_data_uri(color: [u8; 4]) -> String {
        use base64::Engine;
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(4, 4, image::Rgba(color)));
        let png = crate::image::encode(&img, ImageFormat::Png, 90).unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    /// Pixel at a millimetre position for a canvas painted at `dpi`.
    fn pixel_at(canvas: &RasterCanvas, dpi: u32, x_mm: f64, y_mm: f64) -> [u8; 4] {
        let k = dpi as f64 / MM_PER_INCH;
        canvas.pixels().get_pixel((x_mm * k) as u32, (y_mm * k) as u32).0
    }

    #[test]
    fn test_canvas_size_follows_dpi() {
        let theme = get_theme_config("minimal");
        let mut p = page(vec![]);
        p.format = PageFormat::A4;
        let rendered = renderer().render_page(&p, &theme, 150).unwrap();
        assert_eq!((rendered.pixel_width, rendered.pixel_height), (1240, 1754));
        assert_eq!(rendered.dpi, 150);
        assert_eq!(rendered.page_index, 1);
    }

    #[test]
    fn test_output_encodings() {
        let theme = get_theme_config("minimal");
        let p = page(vec![]);
        let jpeg = renderer().render_page(&p, &theme, 36).unwrap();
        assert!(crate::image::loader::is_jpeg(&jpeg.image_data));
        let png = renderer()
            .with_options(RenderOptions {
                format: ImageFormat::Png,
                ..RenderOptions::default()
            })
            .render_page(&p, &theme, 36)
            .unwrap();
        assert!(crate::image::loader::is_png(&png.image_data));
        assert_eq!(png.format, ImageFormat::Png);
    }

    #[test]
    fn test_zero_dpi_is_rejected() {
        let theme = get_theme_config("minimal");
        assert!(matches!(
            renderer().render_page(&page(vec![]), &theme, 0),
            Err(RenderError::Geometry { .. })
        ));
    }

    #[test]
    fn test_unreachable_image_draws_placeholder() {
        let theme = get_theme_config("minimal");
        let block = PositionedBlock::new(
            BlockPosition::mm(20.0, 20.0, 80.0, 60.0),
            BlockContent::Image {
                url: "https://unreachable.invalid/photo.jpg".to_string(),
                alt: None,
                caption: None,
                fit: ImageFit::Cover,
            },
        );
        let canvas = renderer().paint(&page(vec![block]), &theme, 72).unwrap();
        assert_eq!(pixel_at(&canvas, 72, 22.0, 22.0), [240, 240, 240, 255]);
        // Outside the block the page background is untouched.
        assert_eq!(pixel_at(&canvas, 72, 10.0, 10.0), theme.colors.background.to_rgba8());
        assert_eq!(canvas.depth(), 0);
    }

    #[test]
    fn test_data_uri_image_is_drawn() {
        let theme = get_theme_config("minimal");
        let block = PositionedBlock::new(
            BlockPosition::mm(20.0, 20.0, 40.0, 40.0),
            BlockContent::Image {
                url: png_data_uri([255, 0, 0, 255]),
                alt: None,
                caption: None,
                fit: ImageFit::Contain,
            },
        );
        let canvas = renderer().paint(&page(vec![block]), &theme, 72).unwrap();
        assert_eq!(pixel_at(&canvas, 72, 40.0, 40.0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_hidden_blocks_are_skipped() {
        let theme = get_theme_config("minimal");
        let mut block = PositionedBlock::new(
            BlockPosition::mm(10.0, 10.0, 50.0, 50.0),
            BlockContent::Spacer,
        );
        block.style.background_color = Some(Color::BLACK);
        block.style.hidden = true;
        let canvas = renderer().paint(&page(vec![block]), &theme, 72).unwrap();
        assert_eq!(pixel_at(&canvas, 72, 30.0, 30.0), theme.colors.background.to_rgba8());
    }

    #[test]
    fn test_percent_geometry_uses_canvas_size() {
        let theme = get_theme_config("minimal");
        let mut block = PositionedBlock::new(
            BlockPosition::percent(50.0, 0.0, 50.0, 100.0),
            BlockContent::Spacer,
        );
        block.style.background_color = Some(Color::BLACK);
        let canvas = renderer().paint(&page(vec![block]), &theme, 72).unwrap();
        let (w, h) = canvas.size();
        assert_eq!(canvas.pixels().get_pixel(w - 2, h / 2).0, [0, 0, 0, 255]);
        assert_ne!(canvas.pixels().get_pixel(2, h / 2).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_opacity_and_rotation_do_not_leak() {
        let theme = get_theme_config("minimal");
        let mut faded = PositionedBlock::new(
            BlockPosition::mm(10.0, 10.0, 20.0, 20.0),
            BlockContent::Spacer,
        );
        faded.style.background_color = Some(Color::BLACK);
        faded.style.opacity = 0.0;
        faded.style.rotation = 45.0;
        let mut solid = PositionedBlock::new(
            BlockPosition::mm(60.0, 60.0, 20.0, 20.0),
            BlockContent::Spacer,
        );
        solid.style.background_color = Some(Color::BLACK);
        let canvas = renderer().paint(&page(vec![faded, solid]), &theme, 72).unwrap();
        assert_eq!(pixel_at(&canvas, 72, 20.0, 20.0), theme.colors.background.to_rgba8());
        assert_eq!(pixel_at(&canvas, 72, 70.0, 70.0), [0, 0, 0, 255]);
        assert!((canvas.current_transform().mean_scale() - 72.0 / MM_PER_INCH).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_block_is_skipped() {
        let theme = get_theme_config("minimal");
        let mut bad = PositionedBlock::new(
            BlockPosition::mm(10.0, 10.0, 0.0, 20.0),
            BlockContent::Spacer,
        );
        bad.style.background_color = Some(Color::BLACK);
        let canvas = renderer().paint(&page(vec![bad]), &theme, 72).unwrap();
        assert_eq!(canvas.depth(), 0);
    }

    #[test]
    fn test_text_blocks_ink_the_page() {
        let theme = get_theme_config("minimal");
        let blocks = vec![
            PositionedBlock::new(
                BlockPosition::mm(10.0, 10.0, 120.0, 12.0),
                BlockContent::Heading {
                    level: 2,
                    text: "Day one".to_string(),
                },
            ),
            PositionedBlock::new(
                BlockPosition::mm(10.0, 30.0, 120.0, 30.0),
                BlockContent::Paragraph {
                    text: "We left the harbour before sunrise.".to_string(),
                },
            ),
        ];
        let canvas = renderer().paint(&page(blocks), &theme, 96).unwrap();
        let background = theme.colors.background.to_rgba8();
        let inked = canvas.pixels().pixels().filter(|p| p.0 != background).count();
        assert!(inked > 100);
    }

    #[test]
    fn test_empty_table_and_every_block_kind_render() {
        let theme = get_theme_config("dark");
        let kinds = vec![
            BlockContent::List {
                ordered: true,
                items: vec!["One".into(), "Two".into()],
            },
            BlockContent::List {
                ordered: false,
                items: vec!["Bread".into()],
            },
            BlockContent::Quote {
                text: "Travel far.".into(),
                author: Some("Someone".into()),
            },
            BlockContent::Callout {
                variant: CalloutVariant::Warning,
                title: None,
                text: "Carry water.".into(),
            },
            BlockContent::Code {
                text: "let x = 1;\nlet y = 2;".into(),
                language: None,
            },
            BlockContent::Table {
                headers: None,
                rows: vec![],
            },
            BlockContent::Table {
                headers: Some(vec!["Day".into(), "Km".into()]),
                rows: vec![vec!["1".into(), "12".into()], vec!["2".into()]],
            },
            BlockContent::Divider,
            BlockContent::Gallery {
                images: vec![
                    crate::content::ImageRef::new(png_data_uri([0, 0, 255, 255])),
                    crate::content::ImageRef::new("nowhere.png"),
                ],
                columns: 2,
            },
            BlockContent::Map {
                image_url: None,
                points: vec!["Lisbon".into(), "Porto".into()],
                description: Some("Coastal route.".into()),
            },
            BlockContent::Text {
                text: "Contents".into(),
                role: TextRole::Label,
            },
        ];
        let blocks = kinds
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let y = 10.0 + i as f64 * 17.0;
                PositionedBlock::new(BlockPosition::mm(10.0, y, 120.0, 15.0), content)
            })
            .collect();
        let canvas = renderer().paint(&page(blocks), &theme, 72).unwrap();
        assert_eq!(canvas.depth(), 0);
    }

    #[test]
    fn test_cover_background_gradient() {
        let theme = get_theme_config("minimal");
        let mut p = page(vec![]);
        p.background = Some(PageBackground {
            color: None,
            gradient: Some([Color::BLACK, Color::WHITE]),
            image: None,
        });
        let canvas = renderer().paint(&p, &theme, 36).unwrap();
        let (_, h) = canvas.size();
        let top = canvas.pixels().get_pixel(5, 0).0[0];
        let bottom = canvas.pixels().get_pixel(5, h - 1).0[0];
        assert!(top < 20 && bottom > 235);
    }
}
