//! Distance encoding and tile geometry

use std::sync::Arc;

use fos_font::{BoundingBox, GlyphPath};

/// One rasterization request
#[derive(Debug, Clone)]
pub struct TileJob {
    /// Atlas resolution class
    pub tile_size: u32,
    /// Tile index within that class
    pub index: u32,
    pub path: Arc<GlyphPath>,
    /// Font-space region mapped onto the tile
    pub view_box: BoundingBox,
    pub exponent: f32,
}

impl TileJob {
    /// Pixels per font unit along x and y
    pub fn scale(&self) -> (f32, f32) {
        let size = self.tile_size as f32;
        (size / self.view_box.width(), size / self.view_box.height())
    }

    /// Font-space centre of pixel (col, row); row 0 is the top edge.
    pub fn sample_point(&self, col: u32, row: u32) -> (f32, f32) {
        let size = self.tile_size as f32;
        let vb = &self.view_box;
        (
            vb.x_min + (col as f32 + 0.5) / size * vb.width(),
            vb.y_max - (row as f32 + 0.5) / size * vb.height(),
        )
    }

    /// Clamp distance for the encoding
    pub fn max_distance(&self) -> f32 {
        self.view_box.width().hypot(self.view_box.height())
    }

    /// Nothing to draw: the tile encodes as all outside
    pub fn is_blank(&self) -> bool {
        self.path.is_degenerate() || self.view_box.is_degenerate()
    }

    pub fn pixel_count(&self) -> usize {
        (self.tile_size * self.tile_size) as usize
    }
}

/// Outline bounds grown by the tile margin.
///
/// The margin is `margin` of the tile plus half a pixel, converted to font
/// units through the larger outline dimension.
pub fn view_box(bounds: BoundingBox, tile_size: u32, margin: f32) -> BoundingBox {
    let size = tile_size.max(1) as f32;
    let pad = bounds.width().max(bounds.height()) / size * (margin * size + 0.5);
    BoundingBox {
        x_min: bounds.x_min - pad,
        y_min: bounds.y_min - pad,
        x_max: bounds.x_max + pad,
        y_max: bounds.y_max + pad,
    }
}

/// Encode an unsigned edge distance; `inside` flips the value around 0.5.
pub fn encode_distance(distance: f32, max_distance: f32, exponent: f32, inside: bool) -> u8 {
    let v = if max_distance > 0.0 {
        let clamped = distance.abs().min(max_distance);
        (1.0 - clamped / max_distance).powf(exponent) / 2.0
    } else {
        0.0
    };
    let v = if inside { 1.0 - v } else { v };
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Recover the signed distance of an encoded byte, negative inside.
pub fn decode_distance(value: u8, max_distance: f32, exponent: f32) -> f32 {
    let v = value as f32 / 255.0;
    let (v, sign) = if v > 0.5 { (1.0 - v, -1.0) } else { (v, 1.0) };
    let t = (v * 2.0).powf(1.0 / exponent);
    sign * (1.0 - t) * max_distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_box_margin() {
        let bounds = BoundingBox { x_min: 0.0, y_min: 0.0, x_max: 640.0, y_max: 320.0 };
        let vb = view_box(bounds, 64, 1.0 / 16.0);
        // 640 / 64 * (4 + 0.5)
        assert!((vb.x_min + 45.0).abs() < 1e-4);
        assert!((vb.y_max - 365.0).abs() < 1e-4);
    }

    #[test]
    fn test_encoding_extremes() {
        assert_eq!(encode_distance(0.0, 100.0, 9.0, false), 128);
        assert_eq!(encode_distance(0.0, 100.0, 9.0, true), 128);
        assert_eq!(encode_distance(100.0, 100.0, 9.0, false), 0);
        assert_eq!(encode_distance(500.0, 100.0, 9.0, true), 255);
        assert_eq!(encode_distance(f32::INFINITY, 100.0, 9.0, false), 0);
        assert_eq!(encode_distance(1.0, 0.0, 9.0, false), 0);
    }

    #[test]
    fn test_encoding_is_monotonic() {
        let outside: Vec<u8> = (0..10).map(|d| encode_distance(d as f32, 10.0, 2.0, false)).collect();
        assert!(outside.windows(2).all(|w| w[0] >= w[1]));
        let inside: Vec<u8> = (0..10).map(|d| encode_distance(d as f32, 10.0, 2.0, true)).collect();
        assert!(inside.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_decode_sign() {
        let d = decode_distance(encode_distance(3.0, 10.0, 1.0, true), 10.0, 1.0);
        assert!(d < 0.0 && (d + 3.0).abs() < 0.1);
    }
}
