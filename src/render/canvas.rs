//! The drawing seam between the page renderer and a pixel backend.
//!
//! Coordinates are in user space, mapped to device pixels by the current
//! transform. The renderer sets up a millimetre user space once per page and
//! nests block transforms inside [`CanvasScope`] guards.

use crate::theme::Color;
use image::RgbaImage;
use std::ops::{Deref, DerefMut};

/// Bezier control-point factor for quarter circles.
pub const KAPPA: f64 = 0.5522847498;

/// A 2D affine transform `[a b c d e f]`, mapping `(x, y)` to
/// `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Clockwise rotation in a y-down space.
    pub fn rotate_degrees(deg: f64) -> Self {
        let (sin, cos) = deg.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// `self` applied after `inner`: `then(inner)(p) == self(inner(p))`.
    pub fn then(&self, inner: &Transform) -> Transform {
        Transform {
            a: self.a * inner.a + self.c * inner.b,
            b: self.b * inner.a + self.d * inner.b,
            c: self.a * inner.c + self.c * inner.d,
            d: self.b * inner.c + self.d * inner.d,
            e: self.a * inner.e + self.c * inner.f + self.e,
            f: self.b * inner.e + self.d * inner.f + self.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn invert(&self) -> Option<Transform> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Transform {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }

    /// Average linear scale factor, for stroke widths and tolerances.
    pub fn mean_scale(&self) -> f64 {
        let det = (self.a * self.d - self.b * self.c).abs();
        det.sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(f64, f64),
    LineTo(f64, f64),
    QuadTo(f64, f64, f64, f64),
    CurveTo(f64, f64, f64, f64, f64, f64),
    Close,
}

/// A sequence of subpaths in user space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub commands: Vec<PathCommand>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn move_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::MoveTo(x, y));
        self
    }

    pub fn line_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::LineTo(x, y));
        self
    }

    pub fn quad_to(&mut self, x1: f64, y1: f64, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::QuadTo(x1, y1, x, y));
        self
    }

    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::CurveTo(x1, y1, x2, y2, x, y));
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.commands.push(PathCommand::Close);
        self
    }

    pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Self {
        let mut p = Path::new();
        p.push_rect(x, y, w, h);
        p
    }

    pub fn push_rect(&mut self, x: f64, y: f64, w: f64, h: f64) -> &mut Self {
        self.move_to(x, y)
            .line_to(x + w, y)
            .line_to(x + w, y + h)
            .line_to(x, y + h)
            .close()
    }

    /// A rectangle with equal corner radii, clamped to half the short side.
    pub fn rounded_rect(x: f64, y: f64, w: f64, h: f64, radius: f64) -> Self {
        let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
        if r <= 0.0 {
            return Self::rect(x, y, w, h);
        }
        let k = r * KAPPA;
        let mut p = Path::new();
        p.move_to(x + r, y)
            .line_to(x + w - r, y)
            .curve_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r)
            .line_to(x + w, y + h - r)
            .curve_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h)
            .line_to(x + r, y + h)
            .curve_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r)
            .line_to(x, y + r)
            .curve_to(x, y + r - k, x + r - k, y, x + r, y)
            .close();
        p
    }

    pub fn ellipse(cx: f64, cy: f64, rx: f64, ry: f64) -> Self {
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);
        let mut p = Path::new();
        p.move_to(cx + rx, cy)
            .curve_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry)
            .curve_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy)
            .curve_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry)
            .curve_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy)
            .close();
        p
    }

    pub fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let mut p = Path::new();
        p.move_to(x0, y0).line_to(x1, y1);
        p
    }

    /// Flatten curves into polylines in device space. Each entry is one
    /// subpath and whether it was explicitly closed.
    pub fn flatten(&self, transform: &Transform, tolerance: f64) -> Vec<(Vec<(f64, f64)>, bool)> {
        let mut out = Vec::new();
        let mut current: Vec<(f64, f64)> = Vec::new();
        let mut start = (0.0, 0.0);
        let mut last = (0.0, 0.0);

        let finish = |current: &mut Vec<(f64, f64)>, closed: bool, out: &mut Vec<_>| {
            if current.len() > 1 {
                out.push((std::mem::take(current), closed));
            } else {
                current.clear();
            }
        };

        for cmd in &self.commands {
            match *cmd {
                PathCommand::MoveTo(x, y) => {
                    finish(&mut current, false, &mut out);
                    start = (x, y);
                    last = start;
                    current.push(transform.apply(x, y));
                }
                PathCommand::LineTo(x, y) => {
                    if current.is_empty() {
                        current.push(transform.apply(last.0, last.1));
                    }
                    last = (x, y);
                    current.push(transform.apply(x, y));
                }
                PathCommand::QuadTo(x1, y1, x, y) => {
                    // Elevate to a cubic.
                    let c1 = (
                        last.0 + 2.0 / 3.0 * (x1 - last.0),
                        last.1 + 2.0 / 3.0 * (y1 - last.1),
                    );
                    let c2 = (x + 2.0 / 3.0 * (x1 - x), y + 2.0 / 3.0 * (y1 - y));
                    if current.is_empty() {
                        current.push(transform.apply(last.0, last.1));
                    }
                    push_cubic(&mut current, transform, last, c1, c2, (x, y), tolerance);
                    last = (x, y);
                }
                PathCommand::CurveTo(x1, y1, x2, y2, x, y) => {
                    if current.is_empty() {
                        current.push(transform.apply(last.0, last.1));
                    }
                    let (c1, c2) = ((x1, y1), (x2, y2));
                    push_cubic(&mut current, transform, last, c1, c2, (x, y), tolerance);
                    last = (x, y);
                }
                PathCommand::Close => {
                    if !current.is_empty() {
                        current.push(transform.apply(start.0, start.1));
                    }
                    finish(&mut current, true, &mut out);
                    last = start;
                }
            }
        }
        finish(&mut current, false, &mut out);
        out
    }
}

fn push_cubic(
    out: &mut Vec<(f64, f64)>,
    transform: &Transform,
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    tolerance: f64,
) {
    let d0 = transform.apply(p0.0, p0.1);
    let d1 = transform.apply(p1.0, p1.1);
    let d2 = transform.apply(p2.0, p2.1);
    let d3 = transform.apply(p3.0, p3.1);
    let hull = dist(d0, d1) + dist(d1, d2) + dist(d2, d3);
    let steps = ((hull / tolerance.max(0.05)).sqrt().ceil() as usize).clamp(1, 64);
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let mt = 1.0 - t;
        let (a, b, c, d) = (mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t);
        out.push((
            a * d0.0 + b * d1.0 + c * d2.0 + d * d3.0,
            a * d0.1 + b * d1.1 + c * d2.1 + d * d3.1,
        ));
    }
}

fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// What a filled path is painted with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    Solid(Color),
    /// Two-stop linear gradient between user-space points.
    LinearGradient {
        from: (f64, f64),
        to: (f64, f64),
        stops: [Color; 2],
    },
}

impl From<Color> for Paint {
    fn from(c: Color) -> Self {
        Paint::Solid(c)
    }
}

/// A drawing surface.
///
/// `save`/`restore` bracket the transform, the opacity and the clip, and must
/// nest. Prefer [`CanvasScope`] over calling them directly.
pub trait Canvas {
    /// Device size in pixels.
    fn size(&self) -> (u32, u32);

    fn save(&mut self);
    fn restore(&mut self);

    /// Concatenate `t` onto the current transform (applied first).
    fn transform(&mut self, t: &Transform);
    fn current_transform(&self) -> Transform;

    /// Multiply the current opacity.
    fn set_opacity(&mut self, opacity: f64);

    /// Intersect the clip with a user-space rectangle.
    fn clip_rect(&mut self, x: f64, y: f64, w: f64, h: f64);

    /// Fill with the nonzero winding rule.
    fn fill_path(&mut self, path: &Path, paint: &Paint);
    fn stroke_path(&mut self, path: &Path, color: Color, width: f64);

    /// Draw `image` stretched over the user-space rectangle.
    fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, w: f64, h: f64);
}

/// Saves canvas state on creation and restores it on drop, so every exit
/// from a block's drawing code leaves the canvas as it found it.
pub struct CanvasScope<'a, C: Canvas + ?Sized> {
    canvas: &'a mut C,
}

impl<'a, C: Canvas + ?Sized> CanvasScope<'a, C> {
    pub fn new(canvas: &'a mut C) -> Self {
        canvas.save();
        Self { canvas }
    }
}

impl<C: Canvas + ?Sized> Deref for CanvasScope<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.canvas
    }
}

impl<C: Canvas + ?Sized> DerefMut for CanvasScope<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.canvas
    }
}

impl<C: Canvas + ?Sized> Drop for CanvasScope<'_, C> {
    fn drop(&mut self) {
        self.canvas.restore();
    }
}
