//! [`Canvas`] over an in-memory RGBA buffer.
//!
//! Paths are flattened to device-space polygons and filled with an
//! anti-aliased scanline rasterizer: each pixel row is sampled at
//! [`SUBSAMPLES`] sub-scanlines, spans are found with the nonzero winding
//! rule, and horizontal coverage at span ends is exact. Strokes are expanded
//! into consistently wound quads and filled the same way. Clips are
//! device-space rectangles.

use super::canvas::{Canvas, Paint, Path, Transform};
use crate::theme::Color;
use image::{Rgba, RgbaImage};

const SUBSAMPLES: usize = 4;
/// Curve flattening tolerance in device pixels.
const TOLERANCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ClipRect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl ClipRect {
    fn intersect(&self, other: &ClipRect) -> ClipRect {
        ClipRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    transform: Transform,
    opacity: f64,
    clip: ClipRect,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    /// +1 for downward edges, -1 for upward.
    winding: i32,
}

pub struct RasterCanvas {
    pixels: RgbaImage,
    state: State,
    stack: Vec<State>,
}

impl RasterCanvas {
    /// A canvas filled with `background`.
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        let pixels = RgbaImage::from_pixel(width, height, Rgba(background.to_rgba8()));
        Self {
            pixels,
            state: State {
                transform: Transform::IDENTITY,
                opacity: 1.0,
                clip: ClipRect {
                    x0: 0.0,
                    y0: 0.0,
                    x1: width as f64,
                    y1: height as f64,
                },
            },
            stack: Vec::new(),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Current save depth; zero when every save has been restored.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn edges_of(subpaths: &[(Vec<(f64, f64)>, bool)]) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (points, _) in subpaths {
            // Fills always close implicitly.
            let n = points.len();
            for i in 0..n {
                let (ax, ay) = points[i];
                let (bx, by) = points[(i + 1) % n];
                if (ay - by).abs() < f64::EPSILON || !ay.is_finite() || !by.is_finite() {
                    continue;
                }
                edges.push(if ay < by {
                    Edge { x0: ax, y0: ay, x1: bx, y1: by, winding: 1 }
                } else {
                    Edge { x0: bx, y0: by, x1: ax, y1: ay, winding: -1 }
                });
            }
        }
        edges
    }

    /// Rasterize device-space edges and blend `shade(x, y)` by coverage.
    fn fill_edges(&mut self, edges: &[Edge], shade: impl Fn(f64, f64) -> [f64; 4]) {
        let clip = self.state.clip;
        if edges.is_empty() || clip.is_empty() {
            return;
        }
        let (ymin, ymax) = edges
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| (lo.min(e.y0), hi.max(e.y1)));
        let (xmin, xmax) = edges.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
            (lo.min(e.x0).min(e.x1), hi.max(e.x0).max(e.x1))
        });

        let row_start = ymin.max(clip.y0).floor().max(0.0) as u32;
        let row_end = (ymax.min(clip.y1).ceil().max(0.0) as u32).min(self.pixels.height());
        let col_start = xmin.max(clip.x0).floor().max(0.0) as usize;
        let col_end =
            (xmax.min(clip.x1).ceil().max(0.0) as usize).min(self.pixels.width() as usize);
        if row_start >= row_end || col_start >= col_end {
            return;
        }

        let mut coverage = vec![0.0f64; col_end - col_start];
        let mut crossings: Vec<(f64, i32)> = Vec::new();
        let weight = 1.0 / SUBSAMPLES as f64;

        for py in row_start..row_end {
            coverage.iter_mut().for_each(|c| *c = 0.0);
            for s in 0..SUBSAMPLES {
                let sy = py as f64 + (s as f64 + 0.5) * weight;
                if sy < clip.y0 || sy >= clip.y1 {
                    continue;
                }
                crossings.clear();
                for e in edges {
                    if sy >= e.y0 && sy < e.y1 {
                        let t = (sy - e.y0) / (e.y1 - e.y0);
                        crossings.push((e.x0 + t * (e.x1 - e.x0), e.winding));
                    }
                }
                crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut winding = 0;
                let mut span_start = 0.0;
                for &(x, w) in &crossings {
                    let was_inside = winding != 0;
                    winding += w;
                    if !was_inside && winding != 0 {
                        span_start = x;
                    } else if was_inside && winding == 0 {
                        let a = span_start.max(clip.x0);
                        let b = x.min(clip.x1);
                        add_span(&mut coverage, col_start, a, b, weight);
                    }
                }
            }

            for (i, &cov) in coverage.iter().enumerate() {
                if cov <= 0.0 {
                    continue;
                }
                let px = (col_start + i) as u32;
                let color = shade(px as f64 + 0.5, py as f64 + 0.5);
                let alpha = color[3] * cov.min(1.0) * self.state.opacity;
                blend(self.pixels.get_pixel_mut(px, py), color, alpha);
            }
        }
    }

    fn shader(&self, paint: &Paint) -> impl Fn(f64, f64) -> [f64; 4] {
        let t = self.state.transform;
        let (from, axis, stops) = match *paint {
            Paint::Solid(c) => ((0.0, 0.0), (0.0, 0.0), [c, c]),
            Paint::LinearGradient { from, to, stops } => {
                let a = t.apply(from.0, from.1);
                let b = t.apply(to.0, to.1);
                (a, (b.0 - a.0, b.1 - a.1), stops)
            }
        };
        let len2 = axis.0 * axis.0 + axis.1 * axis.1;
        move |x, y| {
            let c = if len2 <= f64::EPSILON {
                stops[0]
            } else {
                let t = ((x - from.0) * axis.0 + (y - from.1) * axis.1) / len2;
                stops[0].mix(stops[1], t)
            };
            [c.r, c.g, c.b, c.a]
        }
    }
}

/// Add horizontal coverage of `[a, b)` to the row accumulator.
fn add_span(coverage: &mut [f64], col_start: usize, a: f64, b: f64, weight: f64) {
    if b <= a {
        return;
    }
    let first = (a.floor() as isize).max(col_start as isize);
    let last = ((b.ceil() as isize) - 1).min((col_start + coverage.len()) as isize - 1);
    for px in first..=last {
        let left = a.max(px as f64);
        let right = b.min(px as f64 + 1.0);
        if right > left {
            coverage[px as usize - col_start] += (right - left) * weight;
        }
    }
}

/// Source-over blend of a straight-alpha color onto a pixel.
fn blend(dst: &mut Rgba<u8>, color: [f64; 4], alpha: f64) {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let da = dst.0[3] as f64 / 255.0;
    let out_a = alpha + da * (1.0 - alpha);
    for i in 0..3 {
        let src = color[i].clamp(0.0, 1.0);
        let d = dst.0[i] as f64 / 255.0;
        let v = if out_a > 0.0 {
            (src * alpha + d * da * (1.0 - alpha)) / out_a
        } else {
            0.0
        };
        dst.0[i] = (v * 255.0).round() as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}

/// Expand a polyline into one quad per segment plus a square at each joint,
/// all wound the same way so the nonzero fill unions them.
fn stroke_polygons(points: &[(f64, f64)], half: f64) -> Vec<(Vec<(f64, f64)>, bool)> {
    let mut polys = Vec::new();
    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        let len = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        if len < 1e-9 {
            continue;
        }
        let (nx, ny) = (-(y1 - y0) / len * half, (x1 - x0) / len * half);
        polys.push(clockwise(vec![
            (x0 + nx, y0 + ny),
            (x1 + nx, y1 + ny),
            (x1 - nx, y1 - ny),
            (x0 - nx, y0 - ny),
        ]));
    }
    if points.len() > 2 {
        for &(x, y) in &points[1..points.len() - 1] {
            polys.push(clockwise(vec![
                (x - half, y - half),
                (x + half, y - half),
                (x + half, y + half),
                (x - half, y + half),
            ]));
        }
    }
    polys.into_iter().map(|p| (p, true)).collect()
}

fn clockwise(mut poly: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let area: f64 = poly
        .iter()
        .zip(poly.iter().cycle().skip(1))
        .map(|(a, b)| a.0 * b.1 - b.0 * a.1)
        .sum();
    if area < 0.0 {
        poly.reverse();
    }
    poly
}

impl Canvas for RasterCanvas {
    fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn save(&mut self) {
        self.stack.push(self.state);
    }

    fn restore(&mut self) {
        match self.stack.pop() {
            Some(state) => self.state = state,
            None => log::warn!("canvas restore without a matching save"),
        }
    }

    fn transform(&mut self, t: &Transform) {
        self.state.transform = self.state.transform.then(t);
    }

    fn current_transform(&self) -> Transform {
        self.state.transform
    }

    fn set_opacity(&mut self, opacity: f64) {
        self.state.opacity *= opacity.clamp(0.0, 1.0);
    }

    fn clip_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        let t = self.state.transform;
        let corners = [
            t.apply(x, y),
            t.apply(x + w, y),
            t.apply(x + w, y + h),
            t.apply(x, y + h),
        ];
        let bounds = corners.iter().fold(
            ClipRect {
                x0: f64::INFINITY,
                y0: f64::INFINITY,
                x1: f64::NEG_INFINITY,
                y1: f64::NEG_INFINITY,
            },
            |r, &(cx, cy)| ClipRect {
                x0: r.x0.min(cx),
                y0: r.y0.min(cy),
                x1: r.x1.max(cx),
                y1: r.y1.max(cy),
            },
        );
        self.state.clip = self.state.clip.intersect(&bounds);
    }

    fn fill_path(&mut self, path: &Path, paint: &Paint) {
        if self.state.opacity <= 0.0 {
            return;
        }
        let subpaths = path.flatten(&self.state.transform, TOLERANCE);
        let edges = Self::edges_of(&subpaths);
        let shade = self.shader(paint);
        self.fill_edges(&edges, shade);
    }

    fn stroke_path(&mut self, path: &Path, color: Color, width: f64) {
        if self.state.opacity <= 0.0 || width <= 0.0 {
            return;
        }
        // Hairlines stay visible at one device pixel.
        let half = (width * self.state.transform.mean_scale()).max(1.0) / 2.0;
        let mut polys = Vec::new();
        for (points, _) in path.flatten(&self.state.transform, TOLERANCE) {
            polys.extend(stroke_polygons(&points, half));
        }
        let edges = Self::edges_of(&polys);
        let rgba = [color.r, color.g, color.b, color.a];
        self.fill_edges(&edges, move |_, _| rgba);
    }

    fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, w: f64, h: f64) {
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 || w <= 0.0 || h <= 0.0 || self.state.opacity <= 0.0 {
            return;
        }
        let to_device = self
            .state
            .transform
            .then(&Transform::translate(x, y))
            .then(&Transform::scale(w / iw as f64, h / ih as f64));
        let Some(to_image) = to_device.invert() else {
            return;
        };

        let corners = [(0.0, 0.0), (iw as f64, 0.0), (iw as f64, ih as f64), (0.0, ih as f64)]
            .map(|(cx, cy)| to_device.apply(cx, cy));
        let clip = self.state.clip;
        let xs = corners.map(|c| c.0);
        let ys = corners.map(|c| c.1);
        let min = |v: [f64; 4]| v.into_iter().fold(f64::INFINITY, f64::min);
        let max = |v: [f64; 4]| v.into_iter().fold(f64::NEG_INFINITY, f64::max);
        let x0 = min(xs).max(clip.x0).floor().max(0.0) as u32;
        let y0 = min(ys).max(clip.y0).floor().max(0.0) as u32;
        let x1 = (max(xs).min(clip.x1).ceil().max(0.0) as u32).min(self.pixels.width());
        let y1 = (max(ys).min(clip.y1).ceil().max(0.0) as u32).min(self.pixels.height());

        let opacity = self.state.opacity;
        for py in y0..y1 {
            for px in x0..x1 {
                let (sx, sy) = to_image.apply(px as f64 + 0.5, py as f64 + 0.5);
                if sx < 0.0 || sy < 0.0 || sx >= iw as f64 || sy >= ih as f64 {
                    continue;
                }
                let src = sample_bilinear(image, sx, sy);
                blend(self.pixels.get_pixel_mut(px, py), src, src[3] * opacity);
            }
        }
    }
}

fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> [f64; 4] {
    let (w, h) = image.dimensions();
    let fx = (x - 0.5).max(0.0);
    let fy = (y - 0.5).max(0.0);
    let x0 = (fx.floor() as u32).min(w - 1);
    let y0 = (fy.floor() as u32).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - x0 as f64;
    let ty = fy - y0 as f64;
    let mut out = [0.0; 4];
    for (i, o) in out.iter_mut().enumerate() {
        let p = |px: u32, py: u32| image.get_pixel(px, py).0[i] as f64 / 255.0;
        let top = p(x0, y0) * (1.0 - tx) + p(x1, y0) * tx;
        let bottom = p(x0, y1) * (1.0 - tx) + p(x1, y1) * tx;
        *o = top * (1.0 - ty) + bottom * ty;
    }
    out
}
