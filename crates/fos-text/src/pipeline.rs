//! Pipeline façade: font resolution, typesetting, then atlas allocation

use std::sync::Arc;
use std::time::{Duration, Instant};

use fos_sdf::SdfAtlasCache;
use url::Url;

use crate::config::{PipelineConfig, TextConfig};
use crate::coverage::CoverageDatabase;
use crate::font_cache::FontCache;
use crate::layout::{typeset, Rect, TypesetParams, TypesetResult};
use crate::loader::ResourceLoader;
use crate::resolver::{FontResolver, ResolveRequest};
use crate::{Result, TextError};

/// Quad to draw for one glyph of the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphQuad {
    /// Tile index in the atlas of the result's tile size
    pub atlas_index: u32,
    /// The tile's view-box in layout coordinates
    pub quad: Rect,
}

/// Time spent per stage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timings {
    pub resolve: Duration,
    pub typeset: Duration,
    pub atlas: Duration,
}

impl Timings {
    pub fn total(&self) -> Duration {
        self.resolve + self.typeset + self.atlas
    }
}

/// Output of one [`TextPipeline::render`] call
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub typeset: TypesetResult,
    /// One per entry of `typeset.glyphs`
    pub quads: Vec<GlyphQuad>,
    pub sdf_glyph_size: u32,
    pub timings: Timings,
}

/// Text pipeline
///
/// Owns the font cache and coverage database and shares the SDF atlas,
/// which may serve several pipelines.
#[derive(Debug)]
pub struct TextPipeline {
    config: PipelineConfig,
    resolver: FontResolver,
    atlas: Arc<SdfAtlasCache>,
}

impl TextPipeline {
    /// Create a pipeline with its own atlas
    pub fn new(config: PipelineConfig, loader: Arc<dyn ResourceLoader>) -> Result<Self> {
        let atlas = Arc::new(SdfAtlasCache::with_default_backend(config.atlas_config(), config.scheduler_config()));
        Self::with_atlas(config, loader, atlas)
    }

    /// Create a pipeline that writes into an existing atlas
    pub fn with_atlas(config: PipelineConfig, loader: Arc<dyn ResourceLoader>, atlas: Arc<SdfAtlasCache>) -> Result<Self> {
        config.validate()?;
        let coverage = match &config.data_base_url {
            Some(base) => {
                let base = Url::parse(base).map_err(|e| TextError::InvalidUrl(format!("{base}: {e}")))?;
                Some(CoverageDatabase::new(base, loader.clone()))
            }
            None => None,
        };
        tracing::debug!(
            data = ?config.data_base_url,
            accelerated = atlas.is_accelerated(),
            "text pipeline created"
        );
        let resolver = FontResolver::new(FontCache::new(loader), coverage);
        Ok(Self { config, resolver, atlas })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn atlas(&self) -> &Arc<SdfAtlasCache> {
        &self.atlas
    }

    pub fn fonts(&self) -> &FontCache {
        self.resolver.fonts()
    }

    pub fn coverage(&self) -> Option<&CoverageDatabase> {
        self.resolver.coverage()
    }

    /// Resolve fonts, lay out the text and allocate atlas tiles for every
    /// visible glyph.
    ///
    /// Rasterization of new tiles is only queued; drive it with
    /// [`TextPipeline::flush`] or the atlas' drain ticks.
    pub async fn render(&self, text: &TextConfig) -> Result<PipelineResult> {
        let tile_size = text.sdf_glyph_size.unwrap_or(self.config.default_sdf_glyph_size);
        if tile_size == 0 {
            return Err(TextError::InvalidConfig("sdfGlyphSize must be positive".into()));
        }

        let started = Instant::now();
        let runs = self.resolver.resolve(&text.text, &ResolveRequest::from_config(text)).await?;
        let resolved = Instant::now();

        let params = TypesetParams::from_config(text, self.config.chunk_size);
        let typeset = typeset(&text.text, &runs, &params);
        let laid_out = Instant::now();

        let mut quads = Vec::with_capacity(typeset.glyphs.len());
        for entry in &typeset.glyphs {
            let font = &typeset.fonts[entry.font];
            let tile = self.atlas.get_tile(&font.font, entry.glyph, tile_size)?;
            let view_box = tile.view_box;
            quads.push(GlyphQuad {
                atlas_index: tile.index,
                quad: Rect::new(
                    entry.x + view_box.x_min * font.scale,
                    entry.y + view_box.y_min * font.scale,
                    entry.x + view_box.x_max * font.scale,
                    entry.y + view_box.y_max * font.scale,
                ),
            });
        }
        let finished = Instant::now();

        let timings = Timings {
            resolve: resolved - started,
            typeset: laid_out - resolved,
            atlas: finished - laid_out,
        };
        tracing::debug!(
            glyphs = quads.len(),
            lines = typeset.lines.len(),
            resolve_us = timings.resolve.as_micros() as u64,
            typeset_us = timings.typeset.as_micros() as u64,
            atlas_us = timings.atlas.as_micros() as u64,
            "rendered text"
        );
        Ok(PipelineResult { typeset, quads, sdf_glyph_size: tile_size, timings })
    }

    /// Rasterize all queued tiles; returns how many were written
    pub async fn flush(&self) -> usize {
        self.atlas.flush().await
    }
}

#[cfg(test)]
mod tests {
    use fos_font::testing::TestFontBuilder;

    use super::*;
    use crate::config::FontDescriptor;
    use crate::loader::MemoryLoader;

    fn pipeline() -> TextPipeline {
        let loader = MemoryLoader::new().with("mem://mono.ttf", TestFontBuilder::new().block_glyphs("AB ", 100).build());
        let config = PipelineConfig::default().with_accelerated(false).with_sdf_glyph_size(32);
        TextPipeline::new(config, Arc::new(loader)).unwrap()
    }

    fn text(s: &str) -> TextConfig {
        TextConfig::new(s).with_font(FontDescriptor::new("mem://mono.ttf")).with_font_size(1000.0)
    }

    #[test]
    fn test_quads_follow_glyphs() {
        let pipeline = pipeline();
        let result = smol::block_on(pipeline.render(&text("AB A"))).unwrap();
        assert_eq!(result.sdf_glyph_size, 32);
        assert_eq!(result.quads.len(), 3);
        // the repeated glyph reuses its tile
        assert_eq!(result.quads[0].atlas_index, result.quads[2].atlas_index);
        assert_ne!(result.quads[0].atlas_index, result.quads[1].atlas_index);
        let quad = result.quads[0].quad;
        let ink = result.typeset.glyph_bounds(&result.typeset.glyphs[0]);
        assert!(quad.x_min < ink.x_min && quad.x_max > ink.x_max);
        assert!(quad.y_min < ink.y_min && quad.y_max > ink.y_max);
    }

    #[test]
    fn test_flush_writes_tiles() {
        let pipeline = pipeline();
        let result = smol::block_on(pipeline.render(&text("AB"))).unwrap();
        assert_eq!(pipeline.atlas().pending(), 2);
        assert_eq!(smol::block_on(pipeline.flush()), 2);
        for quad in &result.quads {
            assert!(pipeline.atlas().is_written(32, quad.atlas_index));
        }
    }

    #[test]
    fn test_invalid_data_url() {
        let config = PipelineConfig::default().with_data_base_url("not a url");
        let err = TextPipeline::new(config, Arc::new(MemoryLoader::new())).unwrap_err();
        assert!(matches!(err, TextError::InvalidUrl(_)));
    }

    #[test]
    fn test_per_call_tile_size() {
        let pipeline = pipeline();
        let config = TextConfig { sdf_glyph_size: Some(16), ..text("A") };
        let result = smol::block_on(pipeline.render(&config)).unwrap();
        assert_eq!(result.sdf_glyph_size, 16);
        assert!(pipeline.atlas().layout(16).is_some());
        assert!(pipeline.atlas().layout(32).is_none());
    }
}
