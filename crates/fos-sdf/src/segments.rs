//! Outline flattening and edge queries
//!
//! Glyph paths are reduced to closed polylines in font units. Distances and
//! winding numbers are then evaluated against the line segments directly.

use fos_font::{GlyphPath, PathCommand};

/// Fewest and most segments a single curve is split into
pub const MIN_CURVE_SEGMENTS: u32 = 2;
pub const MAX_CURVE_SEGMENTS: u32 = 16;

/// Target segment length in pixels
const PIXELS_PER_SEGMENT: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    /// Euclidean distance from a point to this segment
    pub fn distance(&self, x: f32, y: f32) -> f32 {
        let dx = self.x1 - self.x0;
        let dy = self.y1 - self.y0;
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq > 0.0 {
            (((x - self.x0) * dx + (y - self.y0) * dy) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let px = self.x0 + t * dx - x;
        let py = self.y0 + t * dy - y;
        (px * px + py * py).sqrt()
    }

    /// Winding contribution of a rightward ray from (x, y)
    fn crossing(&self, x: f32, y: f32) -> i32 {
        let upward = self.y0 <= y && self.y1 > y;
        let downward = self.y1 <= y && self.y0 > y;
        if !upward && !downward {
            return 0;
        }
        // Side of the point relative to the edge direction
        let side = (self.x1 - self.x0) * (y - self.y0) - (x - self.x0) * (self.y1 - self.y0);
        if upward && side > 0.0 {
            1
        } else if downward && side < 0.0 {
            -1
        } else {
            0
        }
    }
}

/// Closed polyline approximation of one glyph
#[derive(Debug, Clone, Default)]
pub struct Polylines {
    pub contours: Vec<Vec<(f32, f32)>>,
}

impl Polylines {
    /// Flatten `path`; `pixels_per_unit` drives the curve subdivision.
    pub fn flatten(path: &GlyphPath, pixels_per_unit: f32) -> Self {
        let mut contours = Vec::new();
        let mut current: Vec<(f32, f32)> = Vec::new();
        let mut pen = (0.0, 0.0);

        let mut finish = |current: &mut Vec<(f32, f32)>| {
            if current.len() > 1 {
                contours.push(std::mem::take(current));
            } else {
                current.clear();
            }
        };

        for cmd in &path.commands {
            match *cmd {
                PathCommand::MoveTo(x, y) => {
                    finish(&mut current);
                    current.push((x, y));
                    pen = (x, y);
                }
                PathCommand::LineTo(x, y) => {
                    if current.is_empty() {
                        current.push(pen);
                    }
                    current.push((x, y));
                    pen = (x, y);
                }
                PathCommand::QuadTo(x1, y1, x, y) => {
                    if current.is_empty() {
                        current.push(pen);
                    }
                    let len = polygon_length(&[pen, (x1, y1), (x, y)]) * pixels_per_unit;
                    let n = curve_segments(len);
                    let (x0, y0) = pen;
                    for i in 1..=n {
                        let t = i as f32 / n as f32;
                        let mt = 1.0 - t;
                        current.push((
                            mt * mt * x0 + 2.0 * mt * t * x1 + t * t * x,
                            mt * mt * y0 + 2.0 * mt * t * y1 + t * t * y,
                        ));
                    }
                    pen = (x, y);
                }
                PathCommand::CurveTo(x1, y1, x2, y2, x, y) => {
                    if current.is_empty() {
                        current.push(pen);
                    }
                    let len = polygon_length(&[pen, (x1, y1), (x2, y2), (x, y)]) * pixels_per_unit;
                    let n = curve_segments(len);
                    let (x0, y0) = pen;
                    for i in 1..=n {
                        let t = i as f32 / n as f32;
                        let mt = 1.0 - t;
                        let a = mt * mt * mt;
                        let b = 3.0 * mt * mt * t;
                        let c = 3.0 * mt * t * t;
                        let d = t * t * t;
                        current.push((
                            a * x0 + b * x1 + c * x2 + d * x,
                            a * y0 + b * y1 + c * y2 + d * y,
                        ));
                    }
                    pen = (x, y);
                }
                PathCommand::Close => {
                    if let Some(&start) = current.first() {
                        pen = start;
                    }
                    finish(&mut current);
                }
            }
        }
        finish(&mut current);

        Self { contours }
    }

    /// Every edge, including the implicit closing edge of each contour
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        for contour in &self.contours {
            for (i, &(x0, y0)) in contour.iter().enumerate() {
                let (x1, y1) = contour[(i + 1) % contour.len()];
                if (x0, y0) != (x1, y1) {
                    segments.push(Segment { x0, y0, x1, y1 });
                }
            }
        }
        segments
    }
}

/// Nonzero winding number of a point
pub fn winding(segments: &[Segment], x: f32, y: f32) -> i32 {
    segments.iter().map(|s| s.crossing(x, y)).sum()
}

/// Distance to the nearest edge, infinite when there are none
pub fn nearest_distance(segments: &[Segment], x: f32, y: f32) -> f32 {
    segments.iter().map(|s| s.distance(x, y)).fold(f32::INFINITY, f32::min)
}

fn polygon_length(points: &[(f32, f32)]) -> f32 {
    points
        .windows(2)
        .map(|w| ((w[1].0 - w[0].0).powi(2) + (w[1].1 - w[0].1).powi(2)).sqrt())
        .sum()
}

fn curve_segments(length_px: f32) -> u32 {
    let n = (length_px / PIXELS_PER_SEGMENT).ceil();
    if n.is_finite() {
        (n as u32).clamp(MIN_CURVE_SEGMENTS, MAX_CURVE_SEGMENTS)
    } else {
        MIN_CURVE_SEGMENTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_font::OutlineBuilder;

    fn square(size: f32) -> GlyphPath {
        let mut path = GlyphPath::new();
        path.move_to(0.0, 0.0);
        path.line_to(size, 0.0);
        path.line_to(size, size);
        path.line_to(0.0, size);
        path.close();
        path
    }

    #[test]
    fn test_square_winding_and_distance() {
        let segments = Polylines::flatten(&square(10.0), 1.0).segments();
        assert_eq!(segments.len(), 4);
        assert_ne!(winding(&segments, 5.0, 5.0), 0);
        assert_eq!(winding(&segments, 15.0, 5.0), 0);
        assert_eq!(winding(&segments, -1.0, 5.0), 0);
        assert!((nearest_distance(&segments, 5.0, 5.0) - 5.0).abs() < 1e-5);
        assert!((nearest_distance(&segments, 13.0, 14.0) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_curve_subdivision_bounds() {
        let mut small = GlyphPath::new();
        small.move_to(0.0, 0.0);
        small.quad_to(1.0, 1.0, 2.0, 0.0);
        small.close();
        // start point plus the minimum of two curve segments
        assert_eq!(Polylines::flatten(&small, 1.0).contours[0].len(), 3);

        let mut large = GlyphPath::new();
        large.move_to(0.0, 0.0);
        large.curve_to(0.0, 1000.0, 1000.0, 1000.0, 1000.0, 0.0);
        large.close();
        assert_eq!(Polylines::flatten(&large, 1.0).contours[0].len(), 17);
    }

    #[test]
    fn test_opposite_contour_cancels() {
        let mut path = square(10.0);
        // inner square wound the other way
        path.move_to(2.0, 2.0);
        path.line_to(2.0, 8.0);
        path.line_to(8.0, 8.0);
        path.line_to(8.0, 2.0);
        path.close();
        let segments = Polylines::flatten(&path, 1.0).segments();
        assert_eq!(winding(&segments, 5.0, 5.0), 0);
        assert_ne!(winding(&segments, 1.0, 5.0), 0);
    }

    #[test]
    fn test_empty_path() {
        let segments = Polylines::flatten(&GlyphPath::new(), 1.0).segments();
        assert!(segments.is_empty());
        assert_eq!(nearest_distance(&segments, 0.0, 0.0), f32::INFINITY);
    }
}
