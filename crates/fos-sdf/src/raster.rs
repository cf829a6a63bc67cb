//! Raster strategies
//!
//! A [`RasterBackend`] hands out reusable [`RasterContext`]s that turn a
//! [`TileJob`] into `tile_size * tile_size` encoded distance bytes.
//!
//! - [`SoftwareBackend`] evaluates winding and edge distance per pixel.
//! - [`SkiaBackend`] fills the outline into a tiny-skia pixmap for the
//!   inside test and min-blends per-edge distances into a scratch buffer.

use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Transform};

use crate::encode::{encode_distance, TileJob};
use crate::segments::{nearest_distance, winding, Polylines, Segment};
use crate::{Result, SdfError};

/// Reusable rasterization state (scratch buffers, device handles)
pub trait RasterContext: Send {
    fn rasterize(&mut self, job: &TileJob) -> Result<Vec<u8>>;
}

/// Source of raster contexts
pub trait RasterBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time capability check
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn create_context(&self) -> Result<Box<dyn RasterContext>>;
}

fn flatten(job: &TileJob) -> Vec<Segment> {
    let (sx, sy) = job.scale();
    Polylines::flatten(&job.path, sx.max(sy)).segments()
}

/// Per-pixel evaluation with no external resources
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    pub fn render(job: &TileJob) -> Vec<u8> {
        let mut out = vec![0u8; job.pixel_count()];
        if job.is_blank() {
            return out;
        }
        let segments = flatten(job);
        let max_distance = job.max_distance();
        for row in 0..job.tile_size {
            for col in 0..job.tile_size {
                let (x, y) = job.sample_point(col, row);
                let inside = winding(&segments, x, y) != 0;
                let d = nearest_distance(&segments, x, y);
                out[(row * job.tile_size + col) as usize] =
                    encode_distance(d, max_distance, job.exponent, inside);
            }
        }
        out
    }
}

impl RasterContext for SoftwareBackend {
    fn rasterize(&mut self, job: &TileJob) -> Result<Vec<u8>> {
        Ok(Self::render(job))
    }
}

impl RasterBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_context(&self) -> Result<Box<dyn RasterContext>> {
        Ok(Box::new(SoftwareBackend))
    }
}

/// tiny-skia raster target
#[derive(Debug, Clone, Copy, Default)]
pub struct SkiaBackend;

impl RasterBackend for SkiaBackend {
    fn name(&self) -> &'static str {
        "tiny-skia"
    }

    fn probe(&self) -> Result<()> {
        Pixmap::new(1, 1)
            .map(|_| ())
            .ok_or_else(|| SdfError::BackendUnavailable("pixmap allocation failed".into()))
    }

    fn create_context(&self) -> Result<Box<dyn RasterContext>> {
        Ok(Box::new(SkiaContext::default()))
    }
}

#[derive(Default)]
struct SkiaContext {
    pixmap: Option<Pixmap>,
    distances: Vec<f32>,
}

impl SkiaContext {
    fn target(&mut self, size: u32) -> Result<&mut Pixmap> {
        let reusable = self.pixmap.as_ref().is_some_and(|p| p.width() == size && p.height() == size);
        if !reusable {
            let pixmap = Pixmap::new(size, size)
                .ok_or_else(|| SdfError::Backend(format!("cannot allocate {size}x{size} target")))?;
            self.pixmap = Some(pixmap);
        }
        let pixmap = self
            .pixmap
            .as_mut()
            .ok_or_else(|| SdfError::Backend("missing raster target".into()))?;
        pixmap.fill(Color::TRANSPARENT);
        Ok(pixmap)
    }
}

impl RasterContext for SkiaContext {
    fn rasterize(&mut self, job: &TileJob) -> Result<Vec<u8>> {
        let size = job.tile_size;
        let mut out = vec![0u8; job.pixel_count()];
        if job.is_blank() {
            return Ok(out);
        }

        let (sx, sy) = job.scale();
        let polylines = Polylines::flatten(&job.path, sx.max(sy));
        let segments = polylines.segments();
        let vb = job.view_box;

        // Stencil pass in pixel space, y down
        let mut builder = PathBuilder::new();
        for contour in &polylines.contours {
            for (i, &(x, y)) in contour.iter().enumerate() {
                let (px, py) = ((x - vb.x_min) * sx, (vb.y_max - y) * sy);
                if i == 0 {
                    builder.move_to(px, py);
                } else {
                    builder.line_to(px, py);
                }
            }
            builder.close();
        }
        let pixmap = self.target(size)?;
        if let Some(path) = builder.finish() {
            let mut paint = Paint::default();
            paint.set_color(Color::WHITE);
            paint.anti_alias = false;
            pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
        let coverage: Vec<bool> = pixmap.pixels().iter().map(|p| p.alpha() > 0).collect();

        // Distance pass: one sweep per edge, min-blended
        self.distances.clear();
        self.distances.resize(job.pixel_count(), f32::INFINITY);
        for segment in &segments {
            for row in 0..size {
                for col in 0..size {
                    let (x, y) = job.sample_point(col, row);
                    let slot = &mut self.distances[(row * size + col) as usize];
                    *slot = slot.min(segment.distance(x, y));
                }
            }
        }

        let max_distance = job.max_distance();
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = encode_distance(self.distances[i], max_distance, job.exponent, coverage[i]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fos_font::{BoundingBox, GlyphPath, OutlineBuilder};

    use super::*;
    use crate::encode::view_box;

    fn ring_job(tile_size: u32) -> TileJob {
        let mut path = GlyphPath::new();
        path.move_to(100.0, 0.0);
        path.quad_to(100.0, 100.0, 0.0, 100.0);
        path.quad_to(-100.0, 100.0, -100.0, 0.0);
        path.quad_to(-100.0, -100.0, 0.0, -100.0);
        path.quad_to(100.0, -100.0, 100.0, 0.0);
        path.close();
        let view_box = view_box(path.bounds(), tile_size, 1.0 / 16.0);
        TileJob { tile_size, index: 0, path: Arc::new(path), view_box, exponent: 9.0 }
    }

    #[test]
    fn test_software_inside_outside() {
        let job = ring_job(32);
        let tile = SoftwareBackend::render(&job);
        assert_eq!(tile.len(), 32 * 32);
        // centre is inside, corner is outside
        assert!(tile[16 * 32 + 16] > 128);
        assert!(tile[0] < 128);
    }

    #[test]
    fn test_backends_agree() {
        let job = ring_job(32);
        let software = SoftwareBackend::render(&job);
        let mut ctx = SkiaBackend.create_context().unwrap();
        let skia = ctx.rasterize(&job).unwrap();
        let differing = software
            .iter()
            .zip(&skia)
            .filter(|(a, b)| (**a as i32 - **b as i32).abs() > 2)
            .count();
        // only stencil edge pixels may disagree
        assert!(differing <= software.len() / 20, "{differing} pixels differ");
    }

    #[test]
    fn test_context_reuse_is_deterministic() {
        let job = ring_job(16);
        let mut ctx = SkiaBackend.create_context().unwrap();
        let first = ctx.rasterize(&job).unwrap();
        let _ = ctx.rasterize(&ring_job(24)).unwrap();
        assert_eq!(ctx.rasterize(&job).unwrap(), first);
    }

    #[test]
    fn test_degenerate_path_is_blank() {
        let mut path = GlyphPath::new();
        path.move_to(5.0, 5.0);
        path.line_to(5.0, 5.0);
        path.close();
        let job = TileJob {
            tile_size: 8,
            index: 0,
            path: Arc::new(path),
            view_box: BoundingBox { x_min: 0.0, y_min: 0.0, x_max: 10.0, y_max: 10.0 },
            exponent: 9.0,
        };
        assert!(SoftwareBackend::render(&job).iter().all(|&b| b == 0));
        let mut ctx = SkiaBackend.create_context().unwrap();
        assert!(ctx.rasterize(&job).unwrap().iter().all(|&b| b == 0));
    }
}
