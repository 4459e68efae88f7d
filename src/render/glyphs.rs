//! Glyph drawing for broken lines of text.
//!
//! Registered TrueType fonts are drawn from their outlines. The standard
//! faces have metrics but no outlines, so they are drawn with the bitmap
//! face, one cell rectangle per inked run, placed at the positions the real
//! metrics produced.

use super::canvas::{Canvas, Paint, Path};
use crate::font::bitmap::{self, GLYPH_COLUMNS, GLYPH_ROWS};
use crate::font::{FontContext, FontData};
use crate::layout::estimate::PT_TO_MM;
use crate::text::{BrokenLine, FontSpec};
use crate::theme::Color;

/// Bitmap glyph height as a fraction of the em.
const BITMAP_GLYPH_EM: f64 = 0.7;
/// Extra ink width for synthetic bold, in cells.
const BOLD_SPREAD: f64 = 0.35;
/// Horizontal shear for synthetic italic, in cells per row.
const ITALIC_SHEAR: f64 = 0.2;

pub struct GlyphPainter<'a> {
    fonts: &'a FontContext,
}

impl<'a> GlyphPainter<'a> {
    pub fn new(fonts: &'a FontContext) -> Self {
        Self { fonts }
    }

    /// Draw `line` with its left edge at `x` and baseline at `baseline`,
    /// both in millimetres.
    pub fn draw_line(
        &self,
        canvas: &mut dyn Canvas,
        line: &BrokenLine,
        x: f64,
        baseline: f64,
        font: &FontSpec,
        color: Color,
    ) {
        if line.chars.is_empty() {
            return;
        }
        let path = match self.fonts.resolve(font.family, font.weight, font.italic) {
            FontData::Custom { data, .. } => outline_path(data, line, x, baseline, font.size),
            FontData::Standard(std_font) => {
                // Requested weight wins when the resolved face has no bold.
                let bold = std_font.bold || font.weight >= 600;
                bitmap_path(line, x, baseline, font.size, bold, font.italic)
            }
        };
        if !path.is_empty() {
            canvas.fill_path(&path, &Paint::Solid(color));
        }
    }
}

fn bitmap_path(
    line: &BrokenLine,
    x: f64,
    baseline: f64,
    size_pt: f64,
    bold: bool,
    italic: bool,
) -> Path {
    let em = size_pt * PT_TO_MM;
    let cell = em * BITMAP_GLYPH_EM / GLYPH_ROWS as f64;
    let spread = if bold { cell * BOLD_SPREAD } else { 0.0 };
    let glyph_width = GLYPH_COLUMNS as f64 * cell;
    let top = baseline - GLYPH_ROWS as f64 * cell;

    let mut path = Path::new();
    for (i, &ch) in line.chars.iter().enumerate() {
        if ch.is_whitespace() {
            continue;
        }
        let start = line.char_positions[i] * PT_TO_MM;
        let end = line
            .char_positions
            .get(i + 1)
            .map(|p| p * PT_TO_MM)
            .unwrap_or(line.width * PT_TO_MM)
            .max(start);
        let gx = x + start + ((end - start) - glyph_width) / 2.0;
        let rows = bitmap::glyph(ch);

        for row in 0..GLYPH_ROWS {
            let shear = if italic {
                (GLYPH_ROWS - 1 - row) as f64 * cell * ITALIC_SHEAR
            } else {
                0.0
            };
            let y = top + row as f64 * cell;
            let mut col = 0;
            while col < GLYPH_COLUMNS {
                if !bitmap::is_set(&rows, col, row) {
                    col += 1;
                    continue;
                }
                let run_start = col;
                while col < GLYPH_COLUMNS && bitmap::is_set(&rows, col, row) {
                    col += 1;
                }
                path.push_rect(
                    gx + shear + run_start as f64 * cell,
                    y,
                    (col - run_start) as f64 * cell + spread,
                    cell,
                );
            }
        }
    }
    path
}

/// Collects a glyph outline into a [`Path`], flipping y and scaling font
/// units to millimetres around a pen position.
struct OutlineSink<'p> {
    path: &'p mut Path,
    x: f64,
    y: f64,
    scale: f64,
}

impl OutlineSink<'_> {
    fn map(&self, px: f32, py: f32) -> (f64, f64) {
        (self.x + px as f64 * self.scale, self.y - py as f64 * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for OutlineSink<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.path.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.path.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.path.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.path.curve_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.path.close();
    }
}

fn outline_path(data: &[u8], line: &BrokenLine, x: f64, baseline: f64, size_pt: f64) -> Path {
    let mut path = Path::new();
    let face = match ttf_parser::Face::parse(data, 0) {
        Ok(face) => face,
        Err(e) => {
            log::warn!("registered font failed to parse at draw time: {}", e);
            return path;
        }
    };
    let scale = size_pt * PT_TO_MM / face.units_per_em() as f64;
    for (i, &ch) in line.chars.iter().enumerate() {
        let Some(glyph_id) = face.glyph_index(ch) else {
            continue;
        };
        let mut sink = OutlineSink {
            path: &mut path,
            x: x + line.char_positions[i] * PT_TO_MM,
            y: baseline,
            scale,
        };
        face.outline_glyph(glyph_id, &mut sink);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::raster::RasterCanvas;
    use crate::text::TextLayout;

    fn line(text: &str, size: f64) -> BrokenLine {
        TextLayout::new()
            .break_into_lines(&FontContext::new(), text, 1000.0, &FontSpec::new("Helvetica", size))
            .remove(0)
    }

    #[test]
    fn test_space_draws_nothing() {
        let path = bitmap_path(&line("   ", 12.0), 0.0, 10.0, 12.0, false, false);
        assert!(path.is_empty());
    }

    #[test]
    fn test_bitmap_glyph_sits_on_baseline() {
        let path = bitmap_path(&line("I", 10.0), 0.0, 10.0, 10.0, false, false);
        let ys: Vec<f64> = path
            .commands
            .iter()
            .filter_map(|c| match c {
                crate::render::canvas::PathCommand::MoveTo(_, y)
                | crate::render::canvas::PathCommand::LineTo(_, y) => Some(*y),
                _ => None,
            })
            .collect();
        let max = ys.iter().cloned().fold(f64::MIN, f64::max);
        let min = ys.iter().cloned().fold(f64::MAX, f64::min);
        assert!((max - 10.0).abs() < 1e-9);
        assert!((max - min - 10.0 * PT_TO_MM * BITMAP_GLYPH_EM).abs() < 1e-9);
    }

    #[test]
    fn test_draw_line_inks_canvas() {
        let fonts = FontContext::new();
        let mut canvas = RasterCanvas::new(60, 20, Color::WHITE);
        let font = FontSpec::new("Helvetica", 12.0);
        let broken = line("Hi", 12.0);
        // Pixels are millimetres here, so the glyphs are about 3 px tall.
        canvas.transform(&crate::render::canvas::Transform::scale(4.0, 4.0));
        GlyphPainter::new(&fonts).draw_line(&mut canvas, &broken, 1.0, 4.0, &font, Color::BLACK);
        let inked = canvas.pixels().pixels().filter(|p| p.0[0] < 128).count();
        assert!(inked > 10);
    }

    #[test]
    fn test_bold_inks_more() {
        let regular = bitmap_path(&line("m", 10.0), 0.0, 10.0, 10.0, false, false);
        let bold = bitmap_path(&line("m", 10.0), 0.0, 10.0, 10.0, true, false);
        let width = |p: &Path| {
            p.commands
                .iter()
                .filter_map(|c| match c {
                    crate::render::canvas::PathCommand::LineTo(x, _) => Some(*x),
                    _ => None,
                })
                .fold(f64::MIN, f64::max)
        };
        assert!(width(&bold) > width(&regular));
    }
}
