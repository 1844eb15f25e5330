//! Page geometry shared by the engine and the redaction pipeline.
//!
//! All coordinates are PDF default user space (points, origin bottom-left).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle, `x0 <= x1`, `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Builds a normalized rectangle from two opposite corners.
    pub fn from_corners(ax: f32, ay: f32, bx: f32, by: f32) -> Self {
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && self.x1 > other.x0 && self.y0 < other.y1 && self.y1 > other.y0
    }
}

/// A quadrilateral covering a stretch of glyphs.
///
/// `ll`/`lr` sit on the descender line, `ul`/`ur` on the ascender line, `l*`
/// at the leading edge of the text and `r*` at the trailing edge. For
/// unrotated text this is a plain rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub ll: Point,
    pub lr: Point,
    pub ur: Point,
    pub ul: Point,
}

impl Quad {
    /// Axis-aligned quad from a rectangle.
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            ll: Point::new(rect.x0, rect.y0),
            lr: Point::new(rect.x1, rect.y0),
            ur: Point::new(rect.x1, rect.y1),
            ul: Point::new(rect.x0, rect.y1),
        }
    }

    /// Corners in drawing order (counter-clockwise for upright text).
    pub fn corners(&self) -> [Point; 4] {
        [self.ll, self.lr, self.ur, self.ul]
    }

    pub fn bounding_rect(&self) -> Rect {
        let xs = self.corners().map(|p| p.x);
        let ys = self.corners().map(|p| p.y);
        Rect {
            x0: xs.iter().copied().fold(f32::INFINITY, f32::min),
            y0: ys.iter().copied().fold(f32::INFINITY, f32::min),
            x1: xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            y1: ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }

    pub fn center(&self) -> Point {
        let c = self.corners();
        Point::new(
            (c[0].x + c[1].x + c[2].x + c[3].x) / 4.0,
            (c[0].y + c[1].y + c[2].y + c[3].y) / 4.0,
        )
    }

    /// Absolute area (shoelace formula).
    pub fn area(&self) -> f32 {
        let c = self.corners();
        let mut twice = 0.0;
        for i in 0..4 {
            let a = c[i];
            let b = c[(i + 1) % 4];
            twice += a.x * b.y - b.x * a.y;
        }
        (twice / 2.0).abs()
    }

    pub fn is_finite(&self) -> bool {
        self.corners().iter().all(Point::is_finite)
    }

    /// True when the quad can be drawn and hit-tested.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.area() > f32::EPSILON
    }

    /// Point-in-convex-quad test. Points on an edge count as inside.
    pub fn contains(&self, p: Point) -> bool {
        let c = self.corners();
        let mut sign = 0.0f32;
        for i in 0..4 {
            let a = c[i];
            let b = c[(i + 1) % 4];
            let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
            if cross.abs() <= 1e-4 {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// Quad spanning from the leading edge of `first` to the trailing edge of `last`.
    ///
    /// Both quads are expected to lie on the same line.
    pub fn span(first: &Quad, last: &Quad) -> Quad {
        Quad {
            ll: first.ll,
            ul: first.ul,
            lr: last.lr,
            ur: last.ur,
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.bounding_rect();
        write!(f, "[{:.2}, {:.2}, {:.2}, {:.2}]", r.x0, r.y0, r.x1, r.y1)
    }
}

/// Fill color for redaction coverage, RGB components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn is_valid(&self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}
