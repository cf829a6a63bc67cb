//! Glyph outline building
//!
//! Every outline format normalizes into the same [`PathCommand`] vocabulary
//! through an [`OutlineBuilder`].

use crate::cff::Charstring;
use crate::glyf::{Component, SimpleGlyph};

/// Glyph outline builder trait (compatible with tiny-skia)
pub trait OutlineBuilder {
    /// Move to point
    fn move_to(&mut self, x: f32, y: f32);
    /// Line to point
    fn line_to(&mut self, x: f32, y: f32);
    /// Quadratic bezier curve
    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32);
    /// Cubic bezier curve
    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32);
    /// Close path
    fn close(&mut self);
}

/// Outline command in font units, y up
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    QuadTo(f32, f32, f32, f32),
    CurveTo(f32, f32, f32, f32, f32, f32),
    Close,
}

/// Axis-aligned bounds in font units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Zero area in at least one dimension
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    fn include(&mut self, x: f32, y: f32) {
        self.x_min = self.x_min.min(x);
        self.y_min = self.y_min.min(y);
        self.x_max = self.x_max.max(x);
        self.y_max = self.y_max.max(y);
    }
}

/// A complete glyph outline with its control-point bounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphPath {
    pub commands: Vec<PathCommand>,
    bounds: Option<BoundingBox>,
}

impl GlyphPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds of all points; zero box for an empty path
    pub fn bounds(&self) -> BoundingBox {
        self.bounds.unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// No drawable area (empty, a single point, or collinear points)
    pub fn is_degenerate(&self) -> bool {
        self.bounds.is_none_or(|b| b.is_degenerate())
    }

    /// Replay this path into another builder
    pub fn replay<B: OutlineBuilder + ?Sized>(&self, builder: &mut B) {
        for cmd in &self.commands {
            match *cmd {
                PathCommand::MoveTo(x, y) => builder.move_to(x, y),
                PathCommand::LineTo(x, y) => builder.line_to(x, y),
                PathCommand::QuadTo(x1, y1, x, y) => builder.quad_to(x1, y1, x, y),
                PathCommand::CurveTo(x1, y1, x2, y2, x, y) => builder.curve_to(x1, y1, x2, y2, x, y),
                PathCommand::Close => builder.close(),
            }
        }
    }

    fn include(&mut self, points: &[(f32, f32)]) {
        for &(x, y) in points {
            match &mut self.bounds {
                Some(b) => b.include(x, y),
                None => self.bounds = Some(BoundingBox { x_min: x, y_min: y, x_max: x, y_max: y }),
            }
        }
    }
}

impl OutlineBuilder for GlyphPath {
    fn move_to(&mut self, x: f32, y: f32) {
        self.include(&[(x, y)]);
        self.commands.push(PathCommand::MoveTo(x, y));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.include(&[(x, y)]);
        self.commands.push(PathCommand::LineTo(x, y));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.include(&[(x1, y1), (x, y)]);
        self.commands.push(PathCommand::QuadTo(x1, y1, x, y));
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.include(&[(x1, y1), (x2, y2), (x, y)]);
        self.commands.push(PathCommand::CurveTo(x1, y1, x2, y2, x, y));
    }

    fn close(&mut self) {
        self.commands.push(PathCommand::Close);
    }
}

/// 2x3 affine transform: x' = a*x + c*y + e, y' = b*x + d*y + f
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// `self` applied after `inner`
    pub fn then_inner(&self, inner: &Transform) -> Transform {
        Transform {
            a: self.a * inner.a + self.c * inner.b,
            b: self.b * inner.a + self.d * inner.b,
            c: self.a * inner.c + self.c * inner.d,
            d: self.b * inner.c + self.d * inner.d,
            e: self.a * inner.e + self.c * inner.f + self.e,
            f: self.b * inner.e + self.d * inner.f + self.f,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

/// Builder adapter applying an affine transform to every point
pub struct TransformBuilder<'b, B: OutlineBuilder + ?Sized> {
    pub inner: &'b mut B,
    pub transform: Transform,
}

impl<B: OutlineBuilder + ?Sized> OutlineBuilder for TransformBuilder<'_, B> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.transform.apply(x, y);
        self.inner.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.transform.apply(x, y);
        self.inner.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.transform.apply(x1, y1);
        let (x, y) = self.transform.apply(x, y);
        self.inner.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.transform.apply(x1, y1);
        let (x2, y2) = self.transform.apply(x2, y2);
        let (x, y) = self.transform.apply(x, y);
        self.inner.curve_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Raw outline data of one glyph, tagged by format.
///
/// [`crate::FontResource::normalize`] turns any variant into path commands.
#[derive(Debug, Clone)]
pub enum OutlineSource<'a> {
    /// No outline (space, missing glyph)
    Empty,
    /// TrueType contours
    Simple(SimpleGlyph),
    /// TrueType references to other glyphs
    Composite(Vec<Component>),
    /// CFF Type 2 charstring program
    Charstring(Charstring<'a>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_bounds_and_degeneracy() {
        let mut path = GlyphPath::new();
        assert!(path.is_degenerate());
        path.move_to(0.0, 0.0);
        path.line_to(10.0, 0.0);
        assert!(path.is_degenerate());
        path.quad_to(10.0, 20.0, 0.0, 10.0);
        path.close();
        assert!(!path.is_degenerate());
        assert_eq!(path.bounds(), BoundingBox { x_min: 0.0, y_min: 0.0, x_max: 10.0, y_max: 20.0 });
        assert_eq!(path.commands.len(), 4);
    }

    #[test]
    fn test_transform_composition() {
        let scale = Transform { a: 2.0, d: 2.0, ..Transform::IDENTITY };
        let shift = Transform { e: 5.0, f: -1.0, ..Transform::IDENTITY };
        // shift after scale
        let combined = shift.then_inner(&scale);
        assert_eq!(combined.apply(1.0, 1.0), (7.0, 1.0));
        assert!(Transform::IDENTITY.is_identity());
    }

    #[test]
    fn test_transform_builder() {
        let mut path = GlyphPath::new();
        let mut builder = TransformBuilder {
            inner: &mut path,
            transform: Transform { a: 0.0, b: 1.0, c: -1.0, d: 0.0, e: 0.0, f: 0.0 },
        };
        builder.move_to(1.0, 0.0);
        builder.close();
        assert_eq!(path.commands[0], PathCommand::MoveTo(0.0, 1.0));
    }
}
